//! Slack Web API calls used by the relay.

use {
    reqwest::Client,
    roomsync_channels::{DirectoryEntry, DirectorySnapshot, OutgoingMessage},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, de::DeserializeOwned},
    serde_json::Value,
    tracing::debug,
};

use crate::{Error, Result};

const PAGE_LIMIT: &str = "200";

/// What `rtm.connect` returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmEndpoint {
    pub url: String,
    pub self_id: String,
}

#[derive(Debug, Deserialize)]
struct RtmConnectResponse {
    url: String,
    #[serde(rename = "self")]
    self_user: SelfUser,
}

#[derive(Debug, Deserialize)]
struct SelfUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct UsersPage {
    #[serde(default)]
    members: Vec<NamedEntry>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Debug, Deserialize)]
struct ChannelsPage {
    #[serde(default)]
    channels: Vec<NamedEntry>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

/// Check the `ok`/`error` envelope and decode the rest.
fn ensure_ok<T: DeserializeOwned>(method: &str, body: Value) -> Result<T> {
    if body.get("ok").and_then(Value::as_bool) != Some(true) {
        let error = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(Error::api(method, error));
    }
    Ok(serde_json::from_value(body)?)
}

/// Thin Slack Web API client bound to one token.
#[derive(Clone)]
pub struct SlackApi {
    client: Client,
    base_url: String,
    token: Secret<String>,
}

impl SlackApi {
    pub fn new(client: Client, base_url: impl Into<String>, token: Secret<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token,
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn get<T: DeserializeOwned>(&self, method: &str, query: &[(&str, &str)]) -> Result<T> {
        let body: Value = self
            .client
            .get(self.url(method))
            .bearer_auth(self.token.expose_secret())
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        ensure_ok(method, body)
    }

    /// Start an RTM session: websocket URL plus the bridge's own user id.
    pub async fn rtm_connect(&self) -> Result<RtmEndpoint> {
        let resp: RtmConnectResponse = self.get("rtm.connect", &[]).await?;
        Ok(RtmEndpoint {
            url: resp.url,
            self_id: resp.self_user.id,
        })
    }

    pub async fn users(&self) -> Result<Vec<DirectoryEntry>> {
        let mut users = Vec::new();
        let mut cursor = String::new();
        loop {
            let page: UsersPage = self
                .get("users.list", &[("limit", PAGE_LIMIT), ("cursor", &cursor)])
                .await?;
            users.extend(
                page.members
                    .into_iter()
                    .map(|m| DirectoryEntry::new(m.id, m.name)),
            );
            if page.response_metadata.next_cursor.is_empty() {
                break;
            }
            cursor = page.response_metadata.next_cursor;
        }
        Ok(users)
    }

    /// Public and private channels visible to the token.
    pub async fn channels(&self) -> Result<Vec<DirectoryEntry>> {
        let mut channels = Vec::new();
        let mut cursor = String::new();
        loop {
            let page: ChannelsPage = self
                .get("conversations.list", &[
                    ("types", "public_channel,private_channel"),
                    ("exclude_archived", "true"),
                    ("limit", PAGE_LIMIT),
                    ("cursor", &cursor),
                ])
                .await?;
            channels.extend(
                page.channels
                    .into_iter()
                    .map(|c| DirectoryEntry::new(c.id, c.name)),
            );
            if page.response_metadata.next_cursor.is_empty() {
                break;
            }
            cursor = page.response_metadata.next_cursor;
        }
        Ok(channels)
    }

    pub async fn directory(&self) -> Result<DirectorySnapshot> {
        Ok(DirectorySnapshot {
            users: self.users().await?,
            channels: self.channels().await?,
        })
    }

    pub async fn post_message(&self, message: &OutgoingMessage) -> Result<()> {
        let mut body = serde_json::json!({
            "channel": message.channel_id,
            "text": message.text,
            "link_names": true,
        });
        if message.as_user {
            body["as_user"] = Value::Bool(true);
        } else {
            if let Some(username) = &message.username {
                body["username"] = Value::String(username.clone());
            }
            if let Some(icon_url) = &message.icon_url {
                body["icon_url"] = Value::String(icon_url.clone());
            }
        }

        let resp: Value = self
            .client
            .post(self.url("chat.postMessage"))
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let _: Value = ensure_ok("chat.postMessage", resp)?;
        debug!(channel_id = %message.channel_id, "chat.postMessage ok");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {mockito::Matcher, serde_json::json};

    use super::*;

    fn api(server: &mockito::Server) -> SlackApi {
        SlackApi::new(Client::new(), server.url(), Secret::new("xoxb-1".into()))
    }

    #[tokio::test]
    async fn rtm_connect_returns_url_and_self_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rtm.connect")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer xoxb-1")
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "ok": true,
                    "url": "wss://example.test/rtm",
                    "self": { "id": "UBOT", "name": "bridge" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let endpoint = api(&server).rtm_connect().await.unwrap();
        assert_eq!(endpoint, RtmEndpoint {
            url: "wss://example.test/rtm".into(),
            self_id: "UBOT".into(),
        });
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_envelope_becomes_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rtm.connect")
            .match_query(Matcher::Any)
            .with_body(json!({ "ok": false, "error": "invalid_auth" }).to_string())
            .create_async()
            .await;

        let err = api(&server).rtm_connect().await.unwrap_err();
        assert!(matches!(&err, Error::Api { method, error } if method == "rtm.connect" && error == "invalid_auth"));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn http_failure_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/users.list")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let err = api(&server).users().await.unwrap_err();
        assert!(matches!(err, Error::Reqwest(_)));
    }

    #[tokio::test]
    async fn users_follow_pagination_cursor() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/users.list")
            .match_query(Matcher::UrlEncoded("cursor".into(), String::new()))
            .with_body(
                json!({
                    "ok": true,
                    "members": [{ "id": "U1", "name": "alice" }],
                    "response_metadata": { "next_cursor": "page2" }
                })
                .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/users.list")
            .match_query(Matcher::UrlEncoded("cursor".into(), "page2".into()))
            .with_body(
                json!({
                    "ok": true,
                    "members": [{ "id": "U2", "name": "bob" }],
                    "response_metadata": { "next_cursor": "" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let users = api(&server).users().await.unwrap();
        assert_eq!(users, vec![
            DirectoryEntry::new("U1", "alice"),
            DirectoryEntry::new("U2", "bob")
        ]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn channels_request_private_groups_too() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/conversations.list")
            .match_query(Matcher::UrlEncoded(
                "types".into(),
                "public_channel,private_channel".into(),
            ))
            .with_body(
                json!({
                    "ok": true,
                    "channels": [{ "id": "C1", "name": "general" }, { "id": "G1", "name": "ops" }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let channels = api(&server).channels().await.unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[1], DirectoryEntry::new("G1", "ops"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn tagged_message_posts_username_and_icon() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat.postMessage")
            .match_body(Matcher::Json(json!({
                "channel": "C1",
                "text": "hi",
                "link_names": true,
                "username": "Ann (via HO:Team)",
                "icon_url": "https://host.example/a.png"
            })))
            .with_body(json!({ "ok": true, "ts": "1.2" }).to_string())
            .create_async()
            .await;

        api(&server)
            .post_message(&OutgoingMessage {
                channel_id: "C1".into(),
                text: "hi".into(),
                username: Some("Ann (via HO:Team)".into()),
                icon_url: Some("https://host.example/a.png".into()),
                as_user: false,
            })
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn membership_notice_posts_as_user() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat.postMessage")
            .match_body(Matcher::PartialJson(json!({ "as_user": true, "link_names": true })))
            .with_body(json!({ "ok": true }).to_string())
            .create_async()
            .await;

        api(&server)
            .post_message(&OutgoingMessage {
                channel_id: "C1".into(),
                text: "Bob has left _Team_".into(),
                username: None,
                icon_url: None,
                as_user: true,
            })
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_post_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat.postMessage")
            .with_body(json!({ "ok": false, "error": "channel_not_found" }).to_string())
            .create_async()
            .await;

        let err = api(&server)
            .post_message(&OutgoingMessage {
                channel_id: "C404".into(),
                text: "x".into(),
                username: None,
                icon_url: None,
                as_user: true,
            })
            .await
            .unwrap_err();
        assert!(!err.is_permanent());
        assert!(err.to_string().contains("channel_not_found"));
    }
}
