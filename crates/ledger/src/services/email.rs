//! Purchase confirmation email delivery.
//!
//! SMTP via lettre with Askama templates, multipart text + HTML. Delivery
//! runs after the purchase transaction commits; callers treat failures as
//! outbox bookkeeping, never as purchase failures.

use askama::Template;
use chrono::{DateTime, Utc};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::instrument;

use storescribe_core::Email;

use crate::config::EmailConfig;
use crate::models::CreditPurchase;

/// HTML template for the purchase confirmation email.
#[derive(Template)]
#[template(path = "email/credits_purchased.html")]
struct CreditsPurchasedHtml<'a> {
    shop_domain: &'a str,
    package_name: &'a str,
    credit_amount: String,
    total_price: String,
    currency: &'a str,
    purchased_on: String,
}

/// Plain text template for the purchase confirmation email.
#[derive(Template)]
#[template(path = "email/credits_purchased.txt")]
struct CreditsPurchasedText<'a> {
    shop_domain: &'a str,
    package_name: &'a str,
    credit_amount: String,
    total_price: String,
    currency: &'a str,
    purchased_on: String,
}

/// Errors that can occur when sending email, discriminated by code.
#[derive(Debug, Error)]
pub enum EmailError {
    /// Email delivery is not configured for this deployment.
    #[error("email is not configured")]
    Config,

    /// SMTP transport could not be constructed.
    #[error("SMTP transport init failed: {0}")]
    Init(SmtpError),

    /// A sender or recipient address failed to parse.
    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    /// The message could not be assembled.
    #[error("failed to build message: {0}")]
    Data(#[from] lettre::error::Error),

    /// Template rendering failed.
    #[error("template error: {0}")]
    Template(#[from] askama::Error),

    /// The SMTP relay rejected or failed the send.
    #[error("SMTP send failed: {0}")]
    Send(SmtpError),
}

/// Email service for ledger notifications.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError::Init`] if the SMTP transport cannot be built.
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(EmailError::Init)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send the purchase confirmation for a committed credit purchase.
    ///
    /// A syntactically invalid recipient is logged and skipped: the purchase
    /// already committed, so there is nothing useful to fail.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError`] if rendering, message assembly, or the SMTP
    /// send fails.
    #[instrument(skip(self, purchase, shop_domain, email, date), fields(shop = %shop_domain, purchase_id = %purchase.id))]
    pub async fn send_credits_purchased(
        &self,
        purchase: &CreditPurchase,
        shop_domain: &str,
        email: &str,
        date: DateTime<Utc>,
    ) -> Result<(), EmailError> {
        let Ok(recipient) = Email::parse(email) else {
            tracing::warn!(
                purchase_id = %purchase.id,
                email = %email,
                "Skipping purchase confirmation: invalid recipient address"
            );
            return Ok(());
        };

        let snapshot = &purchase.snapshot;
        let credit_amount = snapshot.credit_amount.normalize().to_string();
        let total_price = format!("{:.2}", snapshot.total_price);
        let purchased_on = date.format("%B %-d, %Y").to_string();

        let html = CreditsPurchasedHtml {
            shop_domain,
            package_name: &snapshot.name,
            credit_amount: credit_amount.clone(),
            total_price: total_price.clone(),
            currency: snapshot.currency.as_str(),
            purchased_on: purchased_on.clone(),
        }
        .render()?;
        let text = CreditsPurchasedText {
            shop_domain,
            package_name: &snapshot.name,
            credit_amount,
            total_price,
            currency: snapshot.currency.as_str(),
            purchased_on,
        }
        .render()?;

        self.send_multipart_email(
            recipient.as_str(),
            &format!("Your {} credit purchase is confirmed", snapshot.name),
            &text,
            &html,
        )
        .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidEmail(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidEmail(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await.map_err(EmailError::Send)?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    use storescribe_core::{CurrencyCode, PackageId, PurchaseId, PurchaseStatus, ShopId, UsageId};

    use crate::models::{AiFeature, CrawlFeature, Feature, PackageSnapshot, RateLimits};

    fn service() -> EmailService {
        let config = EmailConfig {
            smtp_host: "smtp.example.com".to_owned(),
            smtp_port: 587,
            smtp_username: "mailer".to_owned(),
            smtp_password: "hunter2".into(),
            from_address: "billing@storescribe.app".to_owned(),
        };
        EmailService::new(&config).expect("transport should build")
    }

    fn purchase() -> CreditPurchase {
        let rate = RateLimits {
            rpm: 60,
            rpd: 10_000,
            tpm: 100_000,
            tpd: 2_000_000,
        };
        let now = Utc::now();
        CreditPurchase {
            id: PurchaseId::generate(),
            shop_id: ShopId::generate(),
            package_id: PackageId::generate(),
            usage_id: UsageId::generate(),
            associated_user_id: None,
            shopify_purchase_id: "gid://shopify/AppPurchaseOneTime/1".to_owned(),
            snapshot: PackageSnapshot {
                name: "SMALL".to_owned(),
                credit_amount: Decimal::from(100),
                price_per_credit: Decimal::new(10, 2),
                total_price: Decimal::from(10),
                currency: CurrencyCode::USD,
                is_custom: false,
                feature: Feature {
                    ai: AiFeature {
                        request_limit: 500,
                        token_limit: 100_000,
                        credit_limit: Decimal::from(50),
                        rate,
                    },
                    crawl: CrawlFeature {
                        request_limit: 50,
                        credit_limit: Decimal::from(50),
                        rate,
                    },
                },
            },
            status: PurchaseStatus::Active,
            purchased_at: now,
            expired_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_skipped_not_failed() {
        // The committed purchase is the source of truth by this point; a
        // bad address must not surface as an error. The parse failure
        // returns before any SMTP traffic, so no relay is needed.
        let result = service()
            .send_credits_purchased(&purchase(), "demo.myshopify.com", "not-an-email", Utc::now())
            .await;
        assert!(result.is_ok());
    }
}
