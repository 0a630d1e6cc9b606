//! Credit purchase lifecycle.
//!
//! `purchase_credits_with_promotions` is the canonical entry point: one
//! Serializable transaction creates the usage record, the purchase with its
//! package snapshot, one billing event per consumed promotion or discount,
//! the payment, and the notification outbox row. The confirmation email is
//! dispatched only after the transaction commits; its failure marks the
//! outbox row failed and nothing else.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use storescribe_core::{
    BillingEventKind, BillingType, Email, GatewayPaymentStatus, PackageId, PaymentStatus,
};

use crate::db::{
    NotificationRepository, PackageRepository, PurchaseRepository, RepositoryError,
    ShopRepository, notifications::{NewNotification, insert_notification},
    promotions::{increment_discount_use, increment_promotion_use},
    purchases::{
        ExpiredPackageFilter, ExpiredPackagePage, NewBillingEvent, NewPayment, NewPurchase,
        NewUsage, insert_billing_event, insert_payment, insert_purchase, insert_usage,
        record_subscription_ai_usage, set_payment_status_by_transaction, set_purchase_status,
    },
    run_serializable,
    subscriptions::{decrement_balance, find_active_by_shop_tx},
};
use crate::error::{LedgerError, Result};
use crate::models::{
    CreditPurchase, Notification, PackageSnapshot, Payment, ServiceUsage, ServiceUsageDetails,
    Shop, Subscription, TOPIC_CREDITS_PURCHASED,
};
use crate::services::email::EmailService;
use crate::services::pricing::{BillingOperations, FinalPrice, PricingService};

/// The durable result of a successful purchase.
#[derive(Debug, Clone)]
pub struct PurchaseOutcome {
    pub credit_purchase: CreditPurchase,
    pub payment: Payment,
}

/// Service driving the purchase state machine.
pub struct PurchaseService<'a> {
    pool: &'a PgPool,
    billing: &'a dyn BillingOperations,
    email: Option<&'a EmailService>,
    default_model: &'a str,
}

impl<'a> PurchaseService<'a> {
    /// Create a new purchase service. `email` may be `None` in deployments
    /// without an SMTP relay; outbox rows are then marked failed instead of
    /// dispatched.
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        billing: &'a dyn BillingOperations,
        email: Option<&'a EmailService>,
        default_model: &'a str,
    ) -> Self {
        Self {
            pool,
            billing,
            email,
            default_model,
        }
    }

    /// Purchase a credit package for a shop, applying every applicable
    /// promotion and discount.
    ///
    /// When `email` is supplied it must parse and resolve to a registered
    /// staff user; both failures abort before any write. When it is absent
    /// the most recently seen active staff user (if any) is attributed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ShopNotFound`], [`LedgerError::PackageNotFound`],
    /// [`LedgerError::Validation`] for a malformed email,
    /// [`LedgerError::AssociatedUserNotFound`] for a well-formed but
    /// unregistered one, and [`LedgerError::Conflict`] when the Shopify
    /// charge id was already recorded.
    #[instrument(skip(self, shop_domain, email), fields(shop = %shop_domain))]
    pub async fn purchase_credits_with_promotions(
        &self,
        shop_domain: &str,
        package_id: PackageId,
        shopify_charge_id: &str,
        email: Option<&str>,
    ) -> Result<PurchaseOutcome> {
        let shop = self.resolve_shop(shop_domain).await?;
        let package = PackageRepository::new(self.pool)
            .find_by_id(package_id)
            .await?
            .ok_or(LedgerError::PackageNotFound)?;

        let staff = ShopRepository::new(self.pool)
            .find_current_associated_users(shop.id)
            .await?;

        let attributed_user = match email {
            Some(raw) => {
                let parsed =
                    Email::parse(raw).map_err(|e| LedgerError::Validation(e.to_string()))?;
                let user = ShopRepository::new(self.pool)
                    .find_associated_user_by_email(&parsed)
                    .await?
                    .filter(|user| user.shop_id == shop.id)
                    .ok_or_else(|| LedgerError::AssociatedUserNotFound {
                        email: raw.to_owned(),
                    })?;
                Some(user)
            }
            None => staff.first().cloned(),
        };

        let pricing = PricingService::new(self.pool, self.billing)
            .calculate_final_price(package_id, shop.id)
            .await?;

        let shop_id = shop.id;
        let associated_user_id = attributed_user.as_ref().map(|u| u.id);
        let recipient = attributed_user
            .as_ref()
            .and_then(|u| u.email.clone())
            .or_else(|| shop.email.clone());
        let snapshot = PackageSnapshot::of(&package);
        let purchased_at = Utc::now();
        let new_usage = NewUsage {
            shop_id,
            associated_user_id,
            subscription_id: None,
            model_name: self.default_model.to_owned(),
            service_usage: ServiceUsage::seeded_from(&package.feature, purchased_at),
        };
        let base_amount = package.total_price;
        let currency = package.currency;

        // Each retry attempt gets its own copies, so the boxed future owns
        // everything it touches besides the connection.
        let (purchase, payment, notification) = run_serializable(self.pool, |conn| {
            let new_usage = new_usage.clone();
            let snapshot = snapshot.clone();
            let pricing = pricing.clone();
            let recipient = recipient.clone();
            let shopify_charge_id = shopify_charge_id.to_owned();
            Box::pin(async move {
                let usage = insert_usage(conn, &new_usage).await?;

                let purchase = insert_purchase(
                    conn,
                    &NewPurchase {
                        shop_id,
                        package_id,
                        usage_id: usage.id,
                        associated_user_id,
                        shopify_purchase_id: shopify_charge_id.clone(),
                        snapshot,
                        purchased_at,
                    },
                )
                .await
                .map_err(super::lift)?;

                for applied in &pricing.applied_promotions {
                    insert_billing_event(
                        conn,
                        &NewBillingEvent {
                            purchase_id: purchase.id,
                            kind: BillingEventKind::Promotion,
                            promotion_id: Some(applied.promotion.id),
                            discount_id: None,
                            amount: applied.amount,
                            description: Some(applied.promotion.name.clone()),
                        },
                    )
                    .await?;
                    increment_promotion_use(conn, applied.promotion.id).await?;
                }

                for applied in &pricing.applied_discounts {
                    insert_billing_event(
                        conn,
                        &NewBillingEvent {
                            purchase_id: purchase.id,
                            kind: BillingEventKind::Discount,
                            promotion_id: None,
                            discount_id: Some(applied.discount.id),
                            amount: applied.amount,
                            description: Some(applied.discount.name.clone()),
                        },
                    )
                    .await?;
                    increment_discount_use(conn, applied.discount.id).await?;
                }

                let payment = insert_payment(
                    conn,
                    &NewPayment {
                        purchase_id: Some(purchase.id),
                        subscription_id: None,
                        amount: base_amount,
                        adjusted_amount: pricing.final_price.amount,
                        currency,
                        billing_type: BillingType::OneTime,
                        status: PaymentStatus::Succeeded,
                        transaction_id: shopify_charge_id,
                    },
                )
                .await
                .map_err(super::lift)?;

                let notification = insert_notification(
                    conn,
                    &NewNotification {
                        shop_id,
                        purchase_id: Some(purchase.id),
                        topic: TOPIC_CREDITS_PURCHASED.to_owned(),
                        recipient,
                    },
                )
                .await?;

                Ok((purchase, payment, notification))
            })
        })
        .await?;

        tracing::info!(
            shop = %shop_domain,
            purchase_id = %purchase.id,
            package = %snapshot.name,
            final_price = %pricing.final_price,
            "Credit purchase committed"
        );

        self.dispatch_confirmation(&purchase, shop_domain, &notification)
            .await;

        Ok(PurchaseOutcome {
            credit_purchase: purchase,
            payment,
        })
    }

    /// Deduct credits from the shop's active subscription and meter the
    /// consumption, in one Serializable transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ShopNotFound`] for an unknown shop and
    /// [`LedgerError::InsufficientCredits`] when the balance (or a missing
    /// subscription, reported as zero balance) cannot cover `amount`.
    #[instrument(skip(self, shop_domain), fields(shop = %shop_domain))]
    pub async fn deduct_credits(
        &self,
        shop_domain: &str,
        amount: Decimal,
        model_name: &str,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<Subscription> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(
                "deduction amount must be positive".to_owned(),
            ));
        }

        let shop = self.resolve_shop(shop_domain).await?;
        let shop_id = shop.id;

        run_serializable(self.pool, |conn| {
            let model_name = model_name.to_owned();
            Box::pin(async move {
                let subscription = find_active_by_shop_tx(conn, shop_id)
                    .await?
                    .ok_or(LedgerError::InsufficientCredits {
                        available: Decimal::ZERO,
                        required: amount,
                    })?;

                if subscription.credit_balance < amount {
                    return Err(LedgerError::InsufficientCredits {
                        available: subscription.credit_balance,
                        required: amount,
                    });
                }

                decrement_balance(conn, subscription.id, amount).await?;

                match record_subscription_ai_usage(
                    conn,
                    subscription.id,
                    amount,
                    &model_name,
                    input_tokens,
                    output_tokens,
                )
                .await
                {
                    Ok(()) => {}
                    Err(RepositoryError::NotFound) => {
                        // First deduction for this subscription: create its
                        // usage row with the consumption already counted.
                        let now = Utc::now();
                        let mut service_usage = ServiceUsage {
                            ai: ServiceUsageDetails::seeded(0, Decimal::ZERO, now),
                            crawl: ServiceUsageDetails::seeded(0, Decimal::ZERO, now),
                        };
                        service_usage.ai.credits_used = amount;
                        service_usage.ai.input_tokens_used = input_tokens;
                        service_usage.ai.output_tokens_used = output_tokens;
                        insert_usage(
                            conn,
                            &NewUsage {
                                shop_id,
                                associated_user_id: None,
                                subscription_id: Some(subscription.id),
                                model_name,
                                service_usage,
                            },
                        )
                        .await?;
                    }
                    Err(other) => return Err(other.into()),
                }

                let mut updated = subscription;
                updated.credit_balance -= amount;
                Ok(updated)
            })
        })
        .await
    }

    /// Record a gateway-reported payment status and transition the linked
    /// purchase accordingly.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::PurchaseNotFound`] if no payment carries the
    /// transaction id.
    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        transaction_id: &str,
        gateway_status: &GatewayPaymentStatus,
    ) -> Result<Payment> {
        let payment_status = gateway_status.payment_status();
        let purchase_status = gateway_status.purchase_status();

        let payment = run_serializable(self.pool, |conn| {
            let transaction_id = transaction_id.to_owned();
            Box::pin(async move {
                let payment =
                    set_payment_status_by_transaction(conn, &transaction_id, payment_status)
                        .await
                        .map_err(|e| match e {
                            RepositoryError::NotFound => LedgerError::PurchaseNotFound,
                            other => other.into(),
                        })?;

                if let Some(purchase_id) = payment.purchase_id {
                    set_purchase_status(conn, purchase_id, purchase_status).await?;
                }

                Ok(payment)
            })
        })
        .await?;

        tracing::info!(
            transaction_id = %transaction_id,
            payment_status = %payment_status.as_str(),
            purchase_status = %purchase_status.as_str(),
            "Payment status updated"
        );

        Ok(payment)
    }

    /// Sweep the shop's ACTIVE purchases, expiring any whose consumed
    /// credits meet or exceed the snapshotted credit amount. Returns the
    /// number of purchases expired.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ShopNotFound`] for an unknown shop.
    #[instrument(skip(self, shop_domain), fields(shop = %shop_domain))]
    pub async fn check_and_update_package_status(&self, shop_domain: &str) -> Result<u64> {
        let shop = self.resolve_shop(shop_domain).await?;
        let expired = PurchaseRepository::new(self.pool)
            .expire_consumed(shop.id)
            .await?;

        if expired > 0 {
            tracing::info!(shop = %shop_domain, expired, "Expired consumed purchases");
        }

        Ok(expired)
    }

    /// Expired purchases for a shop, filtered, sorted, and paginated.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ShopNotFound`] for an unknown shop.
    #[instrument(skip(self, shop_domain, filter), fields(shop = %shop_domain))]
    pub async fn expired_packages(
        &self,
        shop_domain: &str,
        filter: &ExpiredPackageFilter,
    ) -> Result<ExpiredPackagePage> {
        let shop = self.resolve_shop(shop_domain).await?;
        Ok(PurchaseRepository::new(self.pool)
            .expired_page(shop.id, filter)
            .await?)
    }

    async fn resolve_shop(&self, shop_domain: &str) -> Result<Shop> {
        ShopRepository::new(self.pool)
            .find_by_domain(shop_domain)
            .await?
            .ok_or(LedgerError::ShopNotFound)
    }

    /// Best-effort post-commit email dispatch. Records the outcome on the
    /// outbox row; never propagates an error.
    async fn dispatch_confirmation(
        &self,
        purchase: &CreditPurchase,
        shop_domain: &str,
        notification: &Notification,
    ) {
        let outbox = NotificationRepository::new(self.pool);

        let outcome = match (self.email, notification.recipient.as_ref()) {
            (Some(service), Some(recipient)) => service
                .send_credits_purchased(
                    purchase,
                    shop_domain,
                    recipient.as_str(),
                    purchase.purchased_at,
                )
                .await
                .map_err(|e| e.to_string()),
            (None, _) => Err("email is not configured".to_owned()),
            (_, None) => Err("no recipient on record".to_owned()),
        };

        let bookkeeping = match outcome {
            Ok(()) => outbox.mark_sent(notification.id).await,
            Err(reason) => {
                tracing::warn!(
                    purchase_id = %purchase.id,
                    notification_id = %notification.id,
                    reason = %reason,
                    "Purchase confirmation not delivered"
                );
                outbox.mark_failed(notification.id, &reason).await
            }
        };

        if let Err(err) = bookkeeping {
            tracing::warn!(
                notification_id = %notification.id,
                error = %err,
                "Failed to record notification outcome"
            );
        }
    }
}
