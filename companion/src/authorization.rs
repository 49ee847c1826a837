//! Outbound authorization URL construction and inbound redirect parsing.

use oauth2::url::{form_urlencoded, Url};
use oauth2::{AuthUrl, ClientId, RedirectUrl, Scope};
use tracing::{debug, warn};

use crate::claims::decode_claims;
use crate::config::OAuthConfig;
use crate::errors::{CompanionError, CompanionResult};

pub const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Scopes requested on every login, in the order they are sent
pub const CALENDAR_SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/userinfo.email",
    "openid",
];

const RESPONSE_TYPE: &str = "code";
const ACCESS_TYPE: &str = "offline";
const PROMPT: &str = "consent";

/// One login attempt's authorization request
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    auth_url: AuthUrl,
    client_id: ClientId,
    redirect_uri: RedirectUrl,
    scopes: Vec<Scope>,
}

/// Tokens handed back on the redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    access_token: String,
    id_token: String,
}

impl AuthorizationRequest {
    pub fn new(config: &OAuthConfig) -> CompanionResult<Self> {
        if config.client_id.trim().is_empty() {
            return Err(CompanionError::config("oauth.client_id is not set"));
        }

        let auth_url = AuthUrl::new(config.auth_endpoint.clone())
            .map_err(|e| CompanionError::config(format!("Invalid auth endpoint: {}", e)))?;
        let redirect_uri = RedirectUrl::new(config.redirect_uri.clone())
            .map_err(|e| CompanionError::config(format!("Invalid redirect URI: {}", e)))?;

        Ok(Self {
            auth_url,
            client_id: ClientId::new(config.client_id.clone()),
            redirect_uri,
            scopes: CALENDAR_SCOPES.iter().map(|s| Scope::new(s.to_string())).collect(),
        })
    }

    pub fn client_id(&self) -> &str {
        self.client_id.as_str()
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uri.as_str()
    }

    pub fn response_type(&self) -> &'static str {
        RESPONSE_TYPE
    }

    pub fn access_type(&self) -> &'static str {
        ACCESS_TYPE
    }

    pub fn prompt(&self) -> &'static str {
        PROMPT
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(|s| s.as_str())
    }

    /// Provider URL the user is sent to
    pub fn authorization_url(&self) -> Url {
        let scope = self.scopes().collect::<Vec<_>>().join(" ");

        let mut url = self.auth_url.url().clone();
        url.query_pairs_mut()
            .append_pair("client_id", self.client_id())
            .append_pair("redirect_uri", self.redirect_uri())
            .append_pair("response_type", RESPONSE_TYPE)
            .append_pair("scope", &scope)
            .append_pair("access_type", ACCESS_TYPE)
            .append_pair("prompt", PROMPT);
        url
    }
}

/// Build the authorization URL for the configured client
pub fn build_authorization_url(config: &OAuthConfig) -> CompanionResult<Url> {
    Ok(AuthorizationRequest::new(config)?.authorization_url())
}

impl TokenSet {
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn id_token(&self) -> &str {
        &self.id_token
    }
}

/// Parse the redirect callback's query into a TokenSet.
///
/// Accepts a bare query string, one with a leading `?`, or the whole
/// callback URL. Both tokens must be present and the id_token must decode.
pub fn parse_redirect_callback(callback: &str) -> CompanionResult<TokenSet> {
    let query = extract_query(callback.trim());

    let mut access_token = None;
    let mut id_token = None;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "access_token" if !value.is_empty() => access_token = Some(value.into_owned()),
            "id_token" if !value.is_empty() => id_token = Some(value.into_owned()),
            "error" => warn!("Authorization redirect reported error: {}", value),
            _ => {}
        }
    }

    let access_token = access_token.ok_or_else(|| CompanionError::missing_token("access_token"))?;
    let id_token = id_token.ok_or_else(|| CompanionError::missing_token("id_token"))?;

    decode_claims(&id_token)?;
    debug!(
        "Captured redirect tokens (access_token length {}, id_token length {})",
        access_token.len(),
        id_token.len()
    );

    Ok(TokenSet { access_token, id_token })
}

fn extract_query(callback: &str) -> &str {
    if let Some((_, query)) = callback.split_once('?') {
        // Fragments never reach the backend, drop them
        return query.split('#').next().unwrap_or_default();
    }
    callback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::test_support::id_token;
    use serde_json::json;

    fn oauth_config() -> OAuthConfig {
        OAuthConfig {
            client_id: "client-123.apps.googleusercontent.com".to_string(),
            redirect_uri: "http://127.0.0.1:8000/api/auth/google/callback".to_string(),
            auth_endpoint: GOOGLE_AUTH_ENDPOINT.to_string(),
        }
    }

    fn valid_id_token() -> String {
        id_token(&json!({"sub": "42", "email": "ada@example.com", "exp": 1714557600}))
    }

    #[test]
    fn test_authorization_url_parameters() {
        let url = build_authorization_url(&oauth_config()).unwrap();

        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(url.path(), "/o/oauth2/v2/auth");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["client_id", "redirect_uri", "response_type", "scope", "access_type", "prompt"]
        );
        assert_eq!(pairs[0].1, "client-123.apps.googleusercontent.com");
        assert_eq!(pairs[1].1, "http://127.0.0.1:8000/api/auth/google/callback");
        assert_eq!(pairs[2].1, "code");
        assert_eq!(
            pairs[3].1,
            "https://www.googleapis.com/auth/calendar.readonly https://www.googleapis.com/auth/userinfo.email openid"
        );
        assert_eq!(pairs[4].1, "offline");
        assert_eq!(pairs[5].1, "consent");
    }

    #[test]
    fn test_authorization_url_is_deterministic() {
        let config = oauth_config();
        assert_eq!(
            build_authorization_url(&config).unwrap(),
            build_authorization_url(&config).unwrap()
        );
    }

    #[test]
    fn test_authorization_url_encodes_redirect() {
        let url = build_authorization_url(&oauth_config()).unwrap();
        let raw = url.as_str();
        assert!(raw.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8000%2Fapi%2Fauth%2Fgoogle%2Fcallback"));
        assert!(!raw.contains("scope=https://"));
    }

    #[test]
    fn test_authorization_request_rejects_bad_config() {
        let mut config = oauth_config();
        config.client_id = "  ".to_string();
        assert!(matches!(AuthorizationRequest::new(&config), Err(CompanionError::Config { .. })));

        let mut config = oauth_config();
        config.redirect_uri = "not a url".to_string();
        assert!(matches!(AuthorizationRequest::new(&config), Err(CompanionError::Config { .. })));
    }

    #[test]
    fn test_parse_callback_verbatim() {
        let id = valid_id_token();
        let query = format!("access_token=ya29.a0Af-_x&id_token={}", id);

        let tokens = parse_redirect_callback(&query).unwrap();
        assert_eq!(tokens.access_token(), "ya29.a0Af-_x");
        assert_eq!(tokens.id_token(), id);
    }

    #[test]
    fn test_parse_callback_from_full_url() {
        let id = valid_id_token();
        let url = format!("http://localhost:5173/dashboard?access_token=tok&id_token={}#top", id);

        let tokens = parse_redirect_callback(&url).unwrap();
        assert_eq!(tokens.access_token(), "tok");
        assert_eq!(tokens.id_token(), id);

        let leading = format!("?id_token={}&access_token=tok", id);
        assert_eq!(parse_redirect_callback(&leading).unwrap(), tokens);
    }

    #[test]
    fn test_parse_callback_missing_tokens() {
        let id = valid_id_token();
        assert_eq!(
            parse_redirect_callback(&format!("id_token={}", id)),
            Err(CompanionError::missing_token("access_token"))
        );
        assert_eq!(
            parse_redirect_callback("access_token=tok"),
            Err(CompanionError::missing_token("id_token"))
        );
        assert_eq!(
            parse_redirect_callback(&format!("access_token=&id_token={}", id)),
            Err(CompanionError::missing_token("access_token"))
        );
        assert_eq!(
            parse_redirect_callback("error=access_denied"),
            Err(CompanionError::missing_token("access_token"))
        );
    }

    #[test]
    fn test_parse_callback_malformed_id_token() {
        assert!(matches!(
            parse_redirect_callback("access_token=tok&id_token=garbage"),
            Err(CompanionError::MalformedToken { .. })
        ));
    }
}
