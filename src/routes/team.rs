//! Team roster proxy
//!
//! Fetches the Slack member list and trims it down to what the website shows.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::json_response;
use crate::context::AppContext;
use crate::error::ClaError;
use crate::http::ApiRequest;

/// Slack's own bot account
const SLACKBOT_ID: &str = "USLACKBOT";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub image_192: String,
    #[serde(default)]
    pub image_512: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub tz: String,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub presence: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberList {
    pub ok: bool,
    #[serde(default)]
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamMember {
    pub name: String,
    pub real_name: String,
    pub tz: String,
    pub image: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub presence: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Team {
    pub ok: bool,
    pub members: Vec<TeamMember>,
}

/// Administrators first, without deleted accounts or the bot
pub fn filter_members(list: MemberList) -> Team {
    let mut members = list.members;
    members.sort_by_key(|m| !m.is_admin);

    let members = members
        .into_iter()
        .filter(|m| m.id != SLACKBOT_ID && !m.deleted)
        .map(|m| TeamMember {
            image: urlencoding::decode(&m.profile.image_512)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| m.profile.image_512.clone()),
            name: m.name,
            real_name: m.real_name,
            tz: m.tz,
            presence: m.presence,
        })
        .collect();

    Team { ok: list.ok, members }
}

fn is_local(host: &str) -> bool {
    host.contains("localhost") || host.contains("127.0.0.1")
}

/// GET /api/team
pub async fn team(ctx: &AppContext, req: &ApiRequest) -> Result<Response<Full<Bytes>>, ClaError> {
    let token = ctx
        .config
        .slack
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ClaError::Upstream("Slack token is not configured".to_string()))?;

    let url = format!(
        "{}/users.list?presence=1",
        ctx.config.slack.api_url.trim_end_matches('/')
    );
    let list: MemberList = ctx
        .http_client
        .get(&url)
        .bearer_auth(token)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ClaError::Upstream(format!("Slack request failed: {}", e)))?
        .json()
        .await
        .map_err(|e| ClaError::Upstream(format!("Invalid Slack response: {}", e)))?;

    if !list.ok {
        warn!("Slack reported an unsuccessful member listing");
    }

    let mut response = json_response(StatusCode::OK, &filter_members(list));
    if req.header(header::HOST.as_str()).map(is_local).unwrap_or(false) {
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            header::HeaderValue::from_static("*"),
        );
    }
    Ok(response)
}
