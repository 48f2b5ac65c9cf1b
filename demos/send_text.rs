/*!
Example: Send a text message to members via message/send

Run:
  WXCOM_CORP_ID=ww... \
  WXCOM_CORP_SECRET=your_app_secret \
  WXCOM_AGENT_ID=1000002 \
  WXCOM_TOUSER="zhangsan|lisi" \
  [optional] WXCOM_TEXT="hello from wxcom-rs" \
  [optional] WXCOM_DUPLICATE_CHECK=1800 \
  cargo run --example send_text

Notes:
- The access_token is fetched on first use and cached; an expired token is refreshed and the
  send retried once without any code here.
- Userids listed in `invaliduser` were not delivered.
*/

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use tracing_subscriber::EnvFilter;
use wxcom_rs::{Content, WxcomClient};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "wxcom_rs=debug".into()),
        )
        .with_target(false)
        .init();

    // Required environment variables
    let corp_id =
        env::var("WXCOM_CORP_ID").context("set WXCOM_CORP_ID (corpid, starts with 'ww')")?;
    let corp_secret =
        env::var("WXCOM_CORP_SECRET").context("set WXCOM_CORP_SECRET (application Secret)")?;
    let agent_id: i64 = env::var("WXCOM_AGENT_ID")
        .context("set WXCOM_AGENT_ID (application AgentId)")?
        .parse()
        .context("WXCOM_AGENT_ID must be an integer")?;
    let touser = env::var("WXCOM_TOUSER").context("set WXCOM_TOUSER (userids joined with '|')")?;

    // Optional environment variables
    let text = env::var("WXCOM_TEXT").unwrap_or_else(|_| "hello from wxcom-rs".to_string());
    let duplicate_check: Option<u32> = env::var("WXCOM_DUPLICATE_CHECK")
        .ok()
        .and_then(|v| v.parse().ok());

    let client = WxcomClient::new(corp_id, corp_secret, agent_id)?;

    let mut message = client.message().to_user(touser.split('|'));
    if let Some(secs) = duplicate_check {
        message = message.duplicate_check(secs);
    }

    println!("request body: {}", message.to_json(Content::text(text.clone()))?);

    let resp = message
        .send(Content::text(text))
        .await
        .context("message/send failed")?;

    println!(
        "send ok: msgid={}, invaliduser='{}', invalidparty='{}', invalidtag='{}'",
        resp.msgid, resp.invaliduser, resp.invalidparty, resp.invalidtag
    );

    Ok(())
}
