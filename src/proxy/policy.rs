// src/proxy/policy.rs
use crate::config::GatewayConfig;
use hyper::{Body, Response, StatusCode};
use serde::Serialize;

/// Decides, from the request path alone, whether a request may reach the upstream.
///
/// Built once at startup and never mutated, so it is shared across connections
/// without synchronisation.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    allowed_prefixes: Vec<String>,
    web_ui_enabled: bool,
    api_documentation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Path is under one of the allowed prefixes.
    Api,
    /// Any other path, forwarded because the web UI is enabled.
    WebUi,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    Forward(Route),
    Deny(DenialBody),
}

impl RoutingDecision {
    pub fn is_forward(&self) -> bool {
        matches!(self, RoutingDecision::Forward(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            RoutingDecision::Forward(Route::Api) => "forwarded_api",
            RoutingDecision::Forward(Route::WebUi) => "forwarded_ui",
            RoutingDecision::Deny(_) => "denied",
        }
    }
}

/// JSON body returned with a 403 when the web UI is disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DenialBody {
    pub error: String,
    pub message: String,
    pub api_documentation: String,
    pub status: String,
}

impl DenialBody {
    pub fn into_response(self) -> Response<Body> {
        super::json_response(StatusCode::FORBIDDEN, &self)
    }
}

impl AccessPolicy {
    pub fn new(
        allowed_prefixes: Vec<String>,
        web_ui_enabled: bool,
        api_documentation: impl Into<String>,
    ) -> Self {
        Self {
            allowed_prefixes,
            web_ui_enabled,
            api_documentation: api_documentation.into(),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.allowed_prefixes.clone(),
            config.web_ui_enabled,
            config.api_documentation.clone(),
        )
    }

    pub fn web_ui_enabled(&self) -> bool {
        self.web_ui_enabled
    }

    pub fn allowed_prefixes(&self) -> &[String] {
        &self.allowed_prefixes
    }

    /// Case-sensitive raw prefix match. Anything that is not an origin-form
    /// path (`*`, authority-form, empty) never matches.
    pub fn is_allowed_path(&self, path: &str) -> bool {
        path.starts_with('/')
            && self
                .allowed_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
    }

    pub fn decide(&self, path: &str) -> RoutingDecision {
        if self.is_allowed_path(path) {
            RoutingDecision::Forward(Route::Api)
        } else if self.web_ui_enabled {
            RoutingDecision::Forward(Route::WebUi)
        } else {
            RoutingDecision::Deny(self.denial())
        }
    }

    fn denial(&self) -> DenialBody {
        DenialBody {
            error: "Web UI is disabled".to_string(),
            message: format!(
                "This deployment only allows API access. Use the {} endpoints.",
                self.allowed_prefixes.join(", ")
            ),
            api_documentation: self.api_documentation.clone(),
            status: "api_only_mode".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(web_ui_enabled: bool) -> AccessPolicy {
        AccessPolicy::new(vec!["/api".to_string()], web_ui_enabled, "/api/docs")
    }

    #[test]
    fn api_only_mode_denies_ui_paths() {
        match policy(false).decide("/agents/list") {
            RoutingDecision::Deny(body) => {
                assert_eq!(body.error, "Web UI is disabled");
                assert_eq!(body.status, "api_only_mode");
                assert_eq!(body.api_documentation, "/api/docs");
                assert!(body.message.contains("/api"));
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn api_paths_are_forwarded() {
        assert_eq!(
            policy(false).decide("/api/agents"),
            RoutingDecision::Forward(Route::Api)
        );
        assert_eq!(policy(false).decide("/api"), RoutingDecision::Forward(Route::Api));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!policy(false).decide("/API/agents").is_forward());
    }

    #[test]
    fn matching_uses_the_raw_path() {
        // %2F is not decoded, so this is not under "/api/".
        let policy = AccessPolicy::new(vec!["/api/".to_string()], false, "/api/docs");
        assert!(!policy.decide("/api%2Fagents").is_forward());
    }

    #[test]
    fn non_origin_form_paths_fail_closed() {
        let policy = AccessPolicy::new(vec!["/".to_string()], false, "/api/docs");
        assert!(!policy.decide("*").is_forward());
        assert!(!policy.decide("").is_forward());
        assert!(!policy.decide("example.com:443").is_forward());
    }

    #[test]
    fn denial_serializes_to_documented_shape() {
        let RoutingDecision::Deny(body) = policy(false).decide("/") else {
            panic!("expected denial");
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "Web UI is disabled");
        assert_eq!(json["status"], "api_only_mode");
        assert_eq!(json["api_documentation"], "/api/docs");
        assert!(json["message"].is_string());
        assert_eq!(json.as_object().unwrap().len(), 4);
    }

    proptest! {
        #[test]
        fn allowed_prefix_always_forwards(suffix in "[a-zA-Z0-9/_.%-]{0,32}", ui in any::<bool>()) {
            let path = format!("/api{}", suffix);
            prop_assert!(policy(ui).decide(&path).is_forward());
        }

        #[test]
        fn other_paths_follow_ui_flag(path in "/[a-zA-Z0-9/_.-]{0,32}", ui in any::<bool>()) {
            prop_assume!(!path.starts_with("/api"));
            let decision = policy(ui).decide(&path);
            prop_assert_eq!(decision.is_forward(), ui);
            if ui {
                prop_assert_eq!(decision, RoutingDecision::Forward(Route::WebUi));
            }
        }

        #[test]
        fn decisions_are_repeatable(path in "[ -~]{0,32}", ui in any::<bool>()) {
            let policy = policy(ui);
            prop_assert_eq!(policy.decide(&path), policy.decide(&path));
        }
    }
}
