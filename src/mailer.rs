//! Outbound alert mail
//!
//! Posts JSON payloads to a Resend-compatible HTTP endpoint. Sending is
//! best-effort: a failed send is logged and dropped, never retried. The
//! downtime itself is still recorded in history regardless of mail
//! outcome. Batches are paced to respect provider rate limits.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::config::MailConfig;

#[derive(Debug, Clone, Serialize)]
pub struct MailPayload {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Clone, Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

#[derive(Debug, Clone)]
pub struct Mailer {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
    dashboard_url: String,
    batch_size: usize,
    pacing: Duration,
}

impl Mailer {
    pub fn new(config: &MailConfig, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.clone(),
            api_key,
            from: config.from.clone(),
            dashboard_url: config.dashboard_url.clone(),
            batch_size: config.batch_size.max(1),
            pacing: Duration::from_millis(config.pacing_ms),
        }
    }

    /// Build the downtime notification for one monitor.
    pub fn downtime_payload(&self, to: &str, url: &str, observed_at: DateTime<Utc>) -> MailPayload {
        MailPayload {
            to: to.to_string(),
            subject: "Website is Down | Uptime Monitoring".to_string(),
            text: format!(
                "Monitor alert: {} appears to be DOWN as of {}.",
                url,
                observed_at.to_rfc3339()
            ),
            html: self.build_downtime_html(url, &observed_at.to_rfc2822()),
        }
    }

    fn build_downtime_html(&self, url: &str, timestamp: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Website Status Notification</title>
  <style>
    body {{ font-family: Helvetica, Arial, sans-serif; background-color: #FAFAFA; margin: 0; padding: 0; }}
    .container {{ max-width: 600px; margin: 40px auto; background: #FFFFFF; padding: 30px; border-radius: 8px; box-shadow: 0 2px 8px rgba(0, 0, 0, 0.05); }}
    h1 {{ font-size: 32px; color: #333; margin-bottom: 20px; }}
    p {{ font-size: 16px; color: #555; line-height: 1.5; }}
    .button {{ display: inline-block; margin-top: 20px; padding: 12px 24px; background-color: #333333; color: #FFFFFF; text-decoration: none; border-radius: 6px; font-size: 18px; }}
    .footer {{ text-align: center; margin-top: 25px; font-size: 12px; color: #999; }}
  </style>
</head>
<body>
<div class="container">
  <h1 style="text-align: center;">Website Status Alert</h1>
  <p style="text-align: center;">We have detected that <strong>{url}</strong> is currently <span style="color: red; font-weight: bold;">unreachable</span> as of <strong>{timestamp}</strong>.</p>
  <p style="text-align: center;">If this notification does not concern you, feel free to disregard it.</p>
  <div style="text-align: center;">
    <a href="{dashboard}" class="button">View Uptime History</a>
  </div>
</div>
<div class="footer">
  Uptime Monitoring
</div>
</body>
</html>
"#,
            url = url,
            timestamp = timestamp,
            dashboard = self.dashboard_url,
        )
    }

    /// Send one mail. Returns whether the provider accepted it.
    #[instrument(skip(self, payload), fields(to = %payload.to))]
    pub async fn send(&self, payload: &MailPayload) -> bool {
        let request = MailRequest {
            from: &self.from,
            to: &payload.to,
            subject: &payload.subject,
            text: &payload.text,
            html: &payload.html,
        };

        let mut builder = self.client.post(&self.api_url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        match builder.send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("email sent to {}", payload.to);
                    true
                } else {
                    error!("failed to send email, status: {}", response.status());
                    if let Ok(error_text) = response.text().await {
                        error!("mail API error response: {}", error_text);
                    }
                    false
                }
            }
            Err(e) => {
                error!("error sending email: {}", e);
                false
            }
        }
    }

    /// Send alert mail in small paced batches. Returns the number of
    /// mails the provider accepted.
    pub async fn send_batches(&self, payloads: Vec<MailPayload>) -> usize {
        let mut accepted = 0;
        let total_batches = payloads.len().div_ceil(self.batch_size);

        for (index, batch) in payloads.chunks(self.batch_size).enumerate() {
            let results = join_all(batch.iter().map(|payload| self.send(payload))).await;
            accepted += results.into_iter().filter(|ok| *ok).count();

            if index + 1 < total_batches {
                tokio::time::sleep(self.pacing).await;
            }
        }

        accepted
    }
}
