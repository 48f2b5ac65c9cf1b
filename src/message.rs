//! WeCom application message push (message/send)
//!
//! Endpoint: POST https://qyapi.weixin.qq.com/cgi-bin/message/send?access_token=ACCESS_TOKEN
//!
//! Notes:
//! - At least one of touser / toparty / totag must be set; ids are joined with `|`.
//! - `agentid` is always taken from the client.
//! - `safe` applies to text/image/video/file, `enable_id_trans` to text/textcard.
//! - Duplicate-send protection is opt-in through `duplicate_check(interval_secs)`.
//! - The builder is a plain value: every setter consumes and returns it, clone to fork.
//!
//! Usage:
//! ```ignore
//! let base = client.message().to_user(["zhangsan", "lisi"]).safe(true);
//! let resp = base.clone().send(Content::text("hello")).await?;
//! let resp = base
//!     .send(VideoContent::new("MEDIA_ID").title("Weekly").description("all hands"))
//!     .await?;
//! println!("msgid={}", resp.msgid);
//! ```

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::token::{Error, Result, WxcomClient};

pub const MESSAGE_SEND_PATH: &str = "/cgi-bin/message/send";

/// Message payloads, tagged by "msgtype".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "msgtype")]
pub enum Content {
    #[serde(rename = "text")]
    Text { text: TextContent },

    #[serde(rename = "image")]
    Image { image: MediaContent },

    #[serde(rename = "voice")]
    Voice { voice: MediaContent },

    #[serde(rename = "video")]
    Video { video: VideoContent },

    #[serde(rename = "file")]
    File { file: MediaContent },

    #[serde(rename = "textcard")]
    TextCard { textcard: TextCardContent },

    #[serde(rename = "markdown")]
    Markdown { markdown: TextContent },
}

impl Content {
    pub fn text(content: impl Into<String>) -> Self {
        Content::Text {
            text: TextContent {
                content: content.into(),
            },
        }
    }

    pub fn image(media_id: impl Into<String>) -> Self {
        Content::Image {
            image: MediaContent::new(media_id),
        }
    }

    pub fn voice(media_id: impl Into<String>) -> Self {
        Content::Voice {
            voice: MediaContent::new(media_id),
        }
    }

    pub fn video(media_id: impl Into<String>) -> Self {
        VideoContent::new(media_id).into()
    }

    pub fn file(media_id: impl Into<String>) -> Self {
        Content::File {
            file: MediaContent::new(media_id),
        }
    }

    pub fn text_card(
        title: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        TextCardContent::new(title, description, url).into()
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Content::Markdown {
            markdown: TextContent {
                content: content.into(),
            },
        }
    }

    /// The "msgtype" value
    pub fn msgtype(&self) -> &'static str {
        match self {
            Content::Text { .. } => "text",
            Content::Image { .. } => "image",
            Content::Voice { .. } => "voice",
            Content::Video { .. } => "video",
            Content::File { .. } => "file",
            Content::TextCard { .. } => "textcard",
            Content::Markdown { .. } => "markdown",
        }
    }

    fn supports_safe(&self) -> bool {
        matches!(
            self,
            Content::Text { .. }
                | Content::Image { .. }
                | Content::Video { .. }
                | Content::File { .. }
        )
    }

    fn supports_id_trans(&self) -> bool {
        matches!(self, Content::Text { .. } | Content::TextCard { .. })
    }
}

/// Text or markdown content (up to 2048 bytes)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextContent {
    pub content: String,
}

/// Image/voice/file content
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaContent {
    /// Temporary media id (media/upload)
    pub media_id: String,
}

impl MediaContent {
    pub fn new(media_id: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoContent {
    pub media_id: String,
    /// Up to 128 bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Up to 512 bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl VideoContent {
    pub fn new(media_id: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            title: None,
            description: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl From<VideoContent> for Content {
    fn from(video: VideoContent) -> Self {
        Content::Video { video }
    }
}

/// Text card: title, HTML-ish description, click-through url and optional button text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextCardContent {
    pub title: String,
    pub description: String,
    pub url: String,
    /// Defaults to "详情" server-side; up to 4 characters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub btntxt: Option<String>,
}

impl TextCardContent {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            url: url.into(),
            btntxt: None,
        }
    }

    pub fn btntxt(mut self, btntxt: impl Into<String>) -> Self {
        self.btntxt = Some(btntxt.into());
        self
    }
}

impl From<TextCardContent> for Content {
    fn from(textcard: TextCardContent) -> Self {
        Content::TextCard { textcard }
    }
}

/// Response for message/send
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessageResponse {
    /// Rejected userids joined with `|`
    #[serde(default)]
    pub invaliduser: String,
    #[serde(default)]
    pub invalidparty: String,
    #[serde(default)]
    pub invalidtag: String,
    #[serde(default)]
    pub unlicenseduser: String,
    #[serde(default)]
    pub msgid: String,
    /// Only for template-card messages with buttons
    #[serde(default)]
    pub response_code: String,
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    touser: String,
    toparty: String,
    totag: String,
    agentid: i64,
    #[serde(flatten)]
    content: &'a Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    safe: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enable_id_trans: Option<u8>,
    enable_duplicate_check: u8,
    duplicate_check_interval: u32,
}

/// Recipients and delivery options for an application message
#[derive(Debug, Clone)]
pub struct Message<'c> {
    client: &'c WxcomClient,
    to_user: Vec<String>,
    to_party: Vec<String>,
    to_tag: Vec<String>,
    safe: bool,
    enable_id_trans: bool,
    duplicate_check_interval: Option<u32>,
}

impl WxcomClient {
    /// Start composing an application message
    pub fn message(&self) -> Message<'_> {
        Message {
            client: self,
            to_user: Vec::new(),
            to_party: Vec::new(),
            to_tag: Vec::new(),
            safe: false,
            enable_id_trans: false,
            duplicate_check_interval: None,
        }
    }
}

impl<'c> Message<'c> {
    /// Member userids
    pub fn to_user<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to_user = users.into_iter().map(Into::into).collect();
        self
    }

    /// Every member in the application's visible range
    pub fn to_all(self) -> Self {
        self.to_user(["@all"])
    }

    /// Department ids
    pub fn to_party<I, S>(mut self, parties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to_party = parties.into_iter().map(Into::into).collect();
        self
    }

    /// Tag ids
    pub fn to_tag<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to_tag = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Confidential message (watermarked, not forwardable)
    pub fn safe(mut self, safe: bool) -> Self {
        self.safe = safe;
        self
    }

    pub fn enable_id_trans(mut self, enable: bool) -> Self {
        self.enable_id_trans = enable;
        self
    }

    /// Reject identical messages sent within `interval_secs` (max 4 hours)
    pub fn duplicate_check(mut self, interval_secs: u32) -> Self {
        self.duplicate_check_interval = Some(interval_secs);
        self
    }

    pub fn without_duplicate_check(mut self) -> Self {
        self.duplicate_check_interval = None;
        self
    }

    /// Render the request body without sending it
    pub fn to_json(&self, content: impl Into<Content>) -> Result<String> {
        let content = content.into();
        let body = self.build(&content)?;
        Ok(serde_json::to_string(&body)?)
    }

    /// Send the message; a nonzero final errcode becomes `Error::Domain`
    #[instrument(level = "debug", skip(self, content))]
    pub async fn send(&self, content: impl Into<Content>) -> Result<SendMessageResponse> {
        let content = content.into();
        let body = self.build(&content)?;
        self.client
            .post_json::<_, SendMessageResponse>(MESSAGE_SEND_PATH, &body)
            .await?
            .into_result()
    }

    fn build<'a>(&self, content: &'a Content) -> Result<SendMessageBody<'a>> {
        if self.to_user.is_empty() && self.to_party.is_empty() && self.to_tag.is_empty() {
            return Err(Error::InvalidRequest(
                "touser, toparty, totag cannot be empty at the same time".to_string(),
            ));
        }
        let flag = |on: bool| u8::from(on);
        Ok(SendMessageBody {
            touser: self.to_user.join("|"),
            toparty: self.to_party.join("|"),
            totag: self.to_tag.join("|"),
            agentid: self.client.agent_id(),
            content,
            safe: content.supports_safe().then(|| flag(self.safe)),
            enable_id_trans: content
                .supports_id_trans()
                .then(|| flag(self.enable_id_trans)),
            enable_duplicate_check: flag(self.duplicate_check_interval.is_some()),
            duplicate_check_interval: self.duplicate_check_interval.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn client() -> WxcomClient {
        WxcomClient::new("ww123", "secret", 1000002).unwrap()
    }

    fn body(msg: &Message<'_>, content: impl Into<Content>) -> Value {
        serde_json::from_str(&msg.to_json(content).unwrap()).unwrap()
    }

    #[test]
    fn text_body_shape() {
        let c = client();
        let msg = c
            .message()
            .to_user(["zhangsan", "lisi"])
            .to_party(["1"])
            .safe(true)
            .duplicate_check(1800);
        assert_eq!(
            body(&msg, Content::text("hello")),
            json!({
                "touser": "zhangsan|lisi",
                "toparty": "1",
                "totag": "",
                "agentid": 1000002,
                "msgtype": "text",
                "text": {"content": "hello"},
                "safe": 1,
                "enable_id_trans": 0,
                "enable_duplicate_check": 1,
                "duplicate_check_interval": 1800
            })
        );
    }

    #[test]
    fn kind_specific_flags() {
        let c = client();
        let msg = c.message().to_tag(["9"]).safe(true).enable_id_trans(true);

        let v = body(&msg, Content::voice("m1"));
        assert_eq!(v["msgtype"], "voice");
        assert_eq!(v["voice"], json!({"media_id": "m1"}));
        assert!(v.get("safe").is_none());
        assert!(v.get("enable_id_trans").is_none());

        let v = body(&msg, Content::markdown("**bold**"));
        assert_eq!(v["markdown"], json!({"content": "**bold**"}));
        assert!(v.get("safe").is_none());

        let v = body(
            &msg,
            TextCardContent::new("Prize", "<div>you won</div>", "https://work.weixin.qq.com")
                .btntxt("More"),
        );
        assert_eq!(v["msgtype"], "textcard");
        assert_eq!(
            v["textcard"],
            json!({
                "title": "Prize",
                "description": "<div>you won</div>",
                "url": "https://work.weixin.qq.com",
                "btntxt": "More"
            })
        );
        assert_eq!(v["enable_id_trans"], 1);
        assert!(v.get("safe").is_none());

        let v = body(&msg, Content::file("f1"));
        assert_eq!(v["safe"], 1);
        assert_eq!(v["enable_duplicate_check"], 0);
        assert_eq!(v["duplicate_check_interval"], 0);
    }

    #[test]
    fn video_optional_fields() {
        let c = client();
        let msg = c.message().to_all();
        let v = body(&msg, Content::video("v1"));
        assert_eq!(v["touser"], "@all");
        assert_eq!(v["video"], json!({"media_id": "v1"}));

        let v = body(&msg, VideoContent::new("v1").title("T").description("D"));
        assert_eq!(
            v["video"],
            json!({"media_id": "v1", "title": "T", "description": "D"})
        );
    }

    #[test]
    fn builder_steps_do_not_leak_into_clones() {
        let c = client();
        let base = c.message().to_user(["a"]);
        let checked = base.clone().duplicate_check(60);
        assert_eq!(body(&base, Content::image("i"))["enable_duplicate_check"], 0);
        assert_eq!(body(&checked, Content::image("i"))["enable_duplicate_check"], 1);
        assert_eq!(
            body(&checked.without_duplicate_check(), Content::image("i"))["enable_duplicate_check"],
            0
        );
    }

    #[test]
    fn no_recipient_is_rejected_locally() {
        let c = client();
        let err = c.message().to_user(Vec::<String>::new()).to_json(Content::text("x"));
        match err {
            Err(Error::InvalidRequest(msg)) => {
                assert_eq!(msg, "touser, toparty, totag cannot be empty at the same time")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn msgtype_names() {
        assert_eq!(Content::text("x").msgtype(), "text");
        assert_eq!(Content::text_card("a", "b", "c").msgtype(), "textcard");
        assert_eq!(Content::markdown("x").msgtype(), "markdown");
    }
}
