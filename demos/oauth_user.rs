/*!
Example: Build authorization links and resolve an OAuth code

Run:
  WXCOM_CORP_ID=ww... WXCOM_CORP_SECRET=... WXCOM_AGENT_ID=1000002 \
  WXCOM_REDIRECT_URI=https://example.com/callback \
  [optional] WXCOM_OAUTH_CODE=CODE_FROM_REDIRECT \
  cargo run --example oauth_user
*/

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use wxcom_rs::WxcomClient;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let corp_id = env::var("WXCOM_CORP_ID").context("set WXCOM_CORP_ID")?;
    let corp_secret = env::var("WXCOM_CORP_SECRET").context("set WXCOM_CORP_SECRET")?;
    let agent_id: i64 = env::var("WXCOM_AGENT_ID")
        .context("set WXCOM_AGENT_ID")?
        .parse()
        .context("WXCOM_AGENT_ID must be an integer")?;
    let redirect_uri = env::var("WXCOM_REDIRECT_URI").context("set WXCOM_REDIRECT_URI")?;

    let client = WxcomClient::new(corp_id, corp_secret, agent_id)?;
    let oauth = client.oauth();

    println!("in-app authorization: {}", oauth.authorization_url(&redirect_uri)?);
    println!("scan-code login:      {}", oauth.scan_code_url(&redirect_uri)?);

    let Ok(code) = env::var("WXCOM_OAUTH_CODE") else {
        println!("set WXCOM_OAUTH_CODE to the `code` from the redirect to resolve the user");
        return Ok(());
    };

    let info = oauth.get_user_info(&code).await.context("getuserinfo failed")?;
    if info.is_member() {
        println!("member: UserId={} DeviceId={}", info.user_id, info.device_id);
    } else {
        println!(
            "non-member: OpenId={} external_userid={}",
            info.open_id, info.external_userid
        );
    }
    Ok(())
}
