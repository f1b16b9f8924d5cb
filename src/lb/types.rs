//! Wire types shared by the LB control plane and its clients.

use serde::{Deserialize, Serialize};

/// The single WebSocket message this daemon ever sends or receives:
/// a request to stand up one round-robin reverse proxy. Field names are
/// exact and case-sensitive; unknown fields are ignored on decode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LbRequest {
    #[serde(rename = "loadBalancerPort")]
    pub loadbalancer_port: String,

    #[serde(rename = "ports")]
    pub upstream_ports: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_exact_field_names_and_ignores_unknown() {
        let json = r#"{"loadBalancerPort":"8080","ports":["9001","9002"],"extra":true}"#;
        let req: LbRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.loadbalancer_port, "8080");
        assert_eq!(req.upstream_ports, vec!["9001", "9002"]);
    }

    #[test]
    fn encodes_with_exact_field_names() {
        let req = LbRequest {
            loadbalancer_port: "8080".to_string(),
            upstream_ports: vec!["9001".to_string()],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"loadBalancerPort":"8080","ports":["9001"]}"#);
    }
}
