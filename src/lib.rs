#![doc = r#"
wxcom-rs

Client for WeCom (Enterprise WeChat) self-built application APIs.

The client caches the application's access_token per agentid and, when an API call reports the
token as expired or invalid (errcode 42001 / 40014), drops it, fetches a new one and reissues
the call once. Callers never handle token refresh themselves.

Currently included:
- token: `WxcomClient`, credentials, access_token acquisition and the unified `Error`.
- token_cache: in-process TTL cache shared by clients of the same process.
- request: authenticated request executor with evict-and-retry-once.
- message: application message push (text, image, voice, video, file, textcard, markdown).
- oauth: web authorization links and user info by code.
- errors: errcode categories, hints and retry advice.

Quick usage:

```ignore
use wxcom_rs::{Content, WxcomClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = WxcomClient::new("ww_corp_id", "app_secret", 1000002)?;

    let resp = client
        .message()
        .to_user(["zhangsan"])
        .send(Content::text("Your parcel has arrived."))
        .await?;
    println!("msgid: {}", resp.msgid);

    let link = client.oauth().authorization_url("https://example.com/callback")?;
    println!("authorize at: {link}");

    Ok(())
}
```
"#]

pub mod errors;
pub mod message;
pub mod oauth;
pub mod request;
pub mod token;
pub mod token_cache;

pub use message::{
    Content, MediaContent, Message, SendMessageResponse, TextCardContent, TextContent,
    VideoContent,
};
pub use oauth::{Oauth, UserInfo};
pub use request::{ApiReply, Envelope};
pub use token::*;
pub use token_cache::TokenCache;
