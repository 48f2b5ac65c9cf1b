/*!
Example: errcode explanation helpers

Run:
  cargo run --example error_help

What this shows:
- How to use wxcom_rs::errors helpers to interpret errcode
- Which codes the client recovers from by itself (token refresh) and which reach callers
- How to detect "Warning: wrong json format." in errmsg
*/

use wxcom_rs::errors::{
    explain, is_credential_issue, is_recipient_issue, is_temporary, is_token_invalid, lookup,
};

fn main() {
    let samples: Vec<(i64, &str)> = vec![
        (-1, "system busy"),
        (0, "ok"),
        (40001, "invalid credential"),
        (40013, "invalid corpid"),
        (40014, "invalid access_token"),
        (42001, "access_token expired"),
        (45009, "api freq out of limit"),
        (81013, "user & party & tag all invalid"),
        (40029, "invalid code"),
        (123456, "unknown"),
        (40003, "Warning: wrong json format. invalid userid"),
    ];

    println!("== WeCom errcode explanation demo ==");
    for (code, errmsg) in samples {
        println!("\n- errcode={} errmsg='{}'\n  {}", code, errmsg, explain(code, errmsg));

        let help = lookup(code);
        println!(
            "  details: category={:?}, refresh_token={}, retry={{enabled:{}, max_retries:{:?}}}",
            help.category, help.refresh_token, help.retry.retry, help.retry.max_retries
        );
        println!(
            "  tags: handled_by_client={} temporary={} recipient={} credential={}",
            is_token_invalid(code),
            is_temporary(code),
            is_recipient_issue(code),
            is_credential_issue(code)
        );
    }
}
