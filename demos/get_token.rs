/*!
Example: Fetch and cache an application access_token

Run:
  WXCOM_CORP_ID=ww... WXCOM_CORP_SECRET=... WXCOM_AGENT_ID=1000002 cargo run --example get_token

The second call is served from the in-process cache; `refresh_access_token` forces a refetch.
*/

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::{Duration, Instant};
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

    let client = WxcomClient::builder(corp_id, corp_secret, agent_id)
        .timeout(Duration::from_secs(10))
        .build()?;

    let started = Instant::now();
    let first = client.get_access_token().await.context("gettoken failed")?;
    println!("[upstream] token len={} in {:?}", first.len(), started.elapsed());

    let started = Instant::now();
    let second = client.get_access_token().await?;
    println!(
        "[cache] same token: {} in {:?}",
        first == second,
        started.elapsed()
    );

    let refreshed = client.refresh_access_token().await?;
    println!("[refresh] token len={}", refreshed.len());

    Ok(())
}
