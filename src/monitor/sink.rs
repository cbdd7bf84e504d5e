use crate::monitor::error::{MonitorError, MonitorResult};
use crate::types::{BuyNotification, TelegramSettings};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Downstream receiver of confirmed buys.
///
/// Errors are logged by the caller and never block cursor or seen-key
/// persistence for the item.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_buy(&self, buy: &BuyNotification) -> MonitorResult<()>;
}

/// Writes each buy to the tracing log
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify_buy(&self, buy: &BuyNotification) -> MonitorResult<()> {
        info!("🟢 {}", buy.description());
        if let Some(ref link) = buy.link {
            info!("   🔗 {}", link);
        }
        Ok(())
    }
}

/// Posts each buy to a Telegram chat through the Bot API
pub struct TelegramSink {
    http: Client,
    api_base: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(settings: &TelegramSettings) -> MonitorResult<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            http,
            api_base: format!("https://api.telegram.org/bot{}", settings.bot_token),
            chat_id: settings.chat_id.clone(),
        })
    }

    fn render(buy: &BuyNotification) -> String {
        let amount = buy
            .ui_amount
            .map(|ui| ui.normalize().to_string())
            .or_else(|| buy.amount.clone())
            .unwrap_or_else(|| "?".to_string());

        let mut text = format!(
            "🟢 <b>{} Buy!</b>\n\n💰 {} {}\n🏦 {}",
            buy.symbol.as_deref().unwrap_or(""),
            amount,
            buy.symbol.as_deref().unwrap_or(""),
            buy.venue
        );
        if let Some(usd) = buy.approx_usd_value {
            text.push_str(&format!("\n💵 ~${:.2}", usd));
        }
        if let Some(ref buyer) = buy.buyer {
            text.push_str(&format!("\n👤 <code>{}</code>", buyer));
        }
        if let Some(ref link) = buy.link {
            text.push_str(&format!("\n🔗 <a href=\"{}\">Transaction</a>", link));
        }
        text
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn notify_buy(&self, buy: &BuyNotification) -> MonitorResult<()> {
        let body = json!({
            "chat_id": self.chat_id,
            "text": Self::render(buy),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let response = self
            .http
            .post(format!("{}/sendMessage", self.api_base))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(MonitorError::Sink(format!(
                "Telegram returned {}: {}",
                status, message
            )));
        }
        Ok(())
    }
}

/// Delivers to every inner sink; one failing sink does not starve the rest
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn notify_buy(&self, buy: &BuyNotification) -> MonitorResult<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.notify_buy(buy).await {
                warn!("Sink delivery failed for {}: {}", buy.tx_digest, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::RecordingSink;
    use rust_decimal::Decimal;

    fn buy() -> BuyNotification {
        BuyNotification {
            venue: "cetus-clmm".to_string(),
            tx_digest: "D1".to_string(),
            amount: Some("1500000".to_string()),
            ui_amount: Some(Decimal::new(1_500_000, 6)),
            symbol: Some("SUITRUMP".to_string()),
            approx_usd_value: None,
            buyer: Some("0xbuyer".to_string()),
            link: Some("https://suiscan.xyz/mainnet/tx/D1".to_string()),
        }
    }

    #[test]
    fn test_telegram_render() {
        let text = TelegramSink::render(&buy());
        assert!(text.contains("1.5 SUITRUMP"));
        assert!(text.contains("cetus-clmm"));
        assert!(text.contains("<code>0xbuyer</code>"));
        assert!(text.contains("https://suiscan.xyz/mainnet/tx/D1"));
        assert!(!text.contains("~$"));
    }

    #[tokio::test]
    async fn test_fanout_delivers_past_failures() {
        let failing = Arc::new(RecordingSink::failing());
        let healthy = Arc::new(RecordingSink::default());
        let sinks: Vec<Arc<dyn NotificationSink>> = vec![
            failing.clone() as Arc<dyn NotificationSink>,
            healthy.clone() as Arc<dyn NotificationSink>,
        ];
        let fanout = FanoutSink::new(sinks);

        let result = fanout.notify_buy(&buy()).await;

        assert!(matches!(result, Err(MonitorError::Sink(_))));
        assert_eq!(failing.received().len(), 1);
        assert_eq!(healthy.received().len(), 1);
    }
}
