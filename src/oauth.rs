//! WeCom web authorization helpers
//!
//! - `authorization_url`: in-app (WeCom client) silent authorization link, `snsapi_base`
//! - `scan_code_url`: QR-code login link for browsers
//! - `get_user_info`: exchange the `code` appended to the redirect for the member identity
//!
//! Endpoint (user info):
//!   GET https://qyapi.weixin.qq.com/cgi-bin/user/getuserinfo?access_token=ACCESS_TOKEN&code=CODE
//!
//! Notes:
//! - `code` is single-use and expires after 5 minutes.
//! - Members get `UserId`/`DeviceId`; non-members get `OpenId` (and `external_userid` when the
//!   visitor is an external contact).

use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::token::{Error, Result, WxcomClient};

pub const AUTHORIZE_URL: &str = "https://open.weixin.qq.com/connect/oauth2/authorize";
pub const SCAN_CODE_URL: &str = "https://open.work.weixin.qq.com/wwopen/sso/qrConnect";
pub const GET_USER_INFO_PATH: &str = "/cgi-bin/user/getuserinfo";

/// Identity behind an OAuth `code`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "UserId", default)]
    pub user_id: String,
    #[serde(rename = "DeviceId", default)]
    pub device_id: String,
    #[serde(rename = "OpenId", default)]
    pub open_id: String,
    #[serde(default)]
    pub external_userid: String,
}

impl UserInfo {
    /// True when the visitor is a member of the enterprise
    pub fn is_member(&self) -> bool {
        !self.user_id.is_empty()
    }
}

/// OAuth helpers bound to a client's corpid and agentid
#[derive(Debug, Clone, Copy)]
pub struct Oauth<'c> {
    client: &'c WxcomClient,
}

impl WxcomClient {
    pub fn oauth(&self) -> Oauth<'_> {
        Oauth { client: self }
    }
}

impl Oauth<'_> {
    /// Web page authorization link (open inside the WeCom client)
    pub fn authorization_url(&self, redirect_uri: &str) -> Result<String> {
        let mut url = parse(AUTHORIZE_URL)?;
        url.query_pairs_mut()
            .append_pair("appid", self.client.corp_id())
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", "snsapi_base")
            .append_pair("state", "");
        url.set_fragment(Some("wechat_redirect"));
        Ok(url.into())
    }

    /// Scan-code login link
    pub fn scan_code_url(&self, redirect_uri: &str) -> Result<String> {
        let mut url = parse(SCAN_CODE_URL)?;
        url.query_pairs_mut()
            .append_pair("appid", self.client.corp_id())
            .append_pair("agentid", &self.client.agent_id().to_string())
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", "");
        Ok(url.into())
    }

    /// Exchange an OAuth `code` for the visitor's identity
    #[instrument(level = "debug", skip(self, code))]
    pub async fn get_user_info(&self, code: &str) -> Result<UserInfo> {
        let info = self
            .client
            .get_json::<UserInfo>(GET_USER_INFO_PATH, &[("code", code)])
            .await?
            .into_result()?;
        debug!(member = info.is_member(), "getuserinfo ok");
        Ok(info)
    }
}

fn parse(s: &str) -> Result<Url> {
    Url::parse(s).map_err(|e| Error::InvalidUrl(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_url_format() {
        let c = WxcomClient::new("123", "321", 1).unwrap();
        assert_eq!(
            c.oauth().authorization_url("https://test.com/query").unwrap(),
            "https://open.weixin.qq.com/connect/oauth2/authorize?appid=123&redirect_uri=https%3A%2F%2Ftest.com%2Fquery&response_type=code&scope=snsapi_base&state=#wechat_redirect"
        );
    }

    #[test]
    fn scan_code_url_format() {
        let c = WxcomClient::new("123", "321", 1).unwrap();
        assert_eq!(
            c.oauth().scan_code_url("https://test.com/query").unwrap(),
            "https://open.work.weixin.qq.com/wwopen/sso/qrConnect?appid=123&agentid=1&redirect_uri=https%3A%2F%2Ftest.com%2Fquery&state="
        );
    }

    #[test]
    fn user_info_field_names() {
        let info: UserInfo = serde_json::from_str(
            r#"{"errcode":0,"errmsg":"ok","UserId":"test_user","DeviceId":"device"}"#,
        )
        .unwrap();
        assert_eq!(info.user_id, "test_user");
        assert_eq!(info.device_id, "device");
        assert!(info.is_member());
        assert!(info.open_id.is_empty());
    }
}
