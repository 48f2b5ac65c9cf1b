/*!
Example: Send a text card and a markdown message to a department

Run:
  WXCOM_CORP_ID=ww... \
  WXCOM_CORP_SECRET=your_app_secret \
  WXCOM_AGENT_ID=1000002 \
  WXCOM_TOPARTY=1 \
  [optional] WXCOM_CARD_URL=https://work.weixin.qq.com \
  cargo run --example send_card
*/

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use wxcom_rs::{Content, TextCardContent, WxcomClient};

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
    let toparty = env::var("WXCOM_TOPARTY")
        .context("set WXCOM_TOPARTY (department ids joined with '|')")?;
    let card_url =
        env::var("WXCOM_CARD_URL").unwrap_or_else(|_| "https://work.weixin.qq.com".to_string());

    let client = WxcomClient::new(corp_id, corp_secret, agent_id)?;
    let base = client.message().to_party(toparty.split('|')).enable_id_trans(true);

    // 1) Text card
    let card = TextCardContent::new(
        "Prize notice",
        "<div class=\"gray\">2016-09-26</div><div class=\"normal\">You won an iPhone 7</div><div class=\"highlight\">Collect before 2016-10-10</div>",
        card_url,
    )
    .btntxt("Details");
    let resp = base.clone().send(card).await.context("textcard send failed")?;
    println!("textcard ok: msgid={}", resp.msgid);

    // 2) Markdown (rendered only in the WeCom client)
    let md = "Your meeting room is booked\n>**Details**\n>Room: <font color=\"info\">TIT 1F 301</font>\n>Time: <font color=\"comment\">9:00-11:00</font>";
    match base.send(Content::markdown(md)).await {
        Ok(resp) => println!("markdown ok: msgid={}", resp.msgid),
        Err(e) => {
            eprintln!("markdown send failed: {e}");
            if let Some(help) = e.explain() {
                eprintln!("  {help}");
            }
        }
    }

    Ok(())
}
