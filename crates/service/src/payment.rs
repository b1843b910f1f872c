//! Payment reconciliation.
//!
//! Three channels race to settle a `PENDING_PAYMENT` order: the checkout
//! callback ([`PaymentService::verify`]), the gateway webhook
//! ([`PaymentService::handle_webhook`]) and the client poll
//! ([`PaymentService::poll_status`]). Each of them goes through
//! [`OrdersRepository::transition`], so the first terminal write wins and the
//! rest observe `Transition::Unchanged`. Notifications are sent only for the
//! winning write.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use gateway::webhook::{WebhookEvent, WebhookEventKind};
use gateway::{
    CreateGatewayOrder, GatewayOrderState, NOTE_ORDER_ID, PaymentGateway, verify_webhook_signature,
};
use model::{
    CURRENCY, Channel, InitiatePaymentRequest, InitiatePaymentResponse, Order, OrderStatus,
    PaymentMeta, PaymentState, PaymentStatusResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};
use notifier::{NotificationDispatcher, OrderEvent};
use repository::{OrdersRepository, RepositoryError, StatusUpdate, Transition};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{PaymentService, ServiceError, parse_order_id};

const SIGNATURE_FAILURE_REASON: &str = "Payment signature verification failed";

/// What a webhook delivery amounted to. Always acknowledged to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// This delivery moved the order to a terminal status.
    Applied { order_id: Uuid, status: OrderStatus },
    /// The order had already been settled by another channel.
    AlreadyResolved { order_id: Uuid, status: OrderStatus },
    /// Event type this service does not act on.
    Ignored(String),
    /// No order matches the event's references.
    Unresolved,
    /// Processing failed internally; logged and swallowed.
    Failed(String),
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied { .. } => "applied",
            WebhookOutcome::AlreadyResolved { .. } => "already_resolved",
            WebhookOutcome::Ignored(_) => "ignored",
            WebhookOutcome::Unresolved => "unresolved",
            WebhookOutcome::Failed(_) => "failed",
        }
    }
}

/// Implementation of [`PaymentService`] over an injected store and gateway.
pub struct PaymentServiceImpl {
    orders: Arc<dyn OrdersRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: NotificationDispatcher,
    webhook_secret: Option<String>,
}

impl PaymentServiceImpl {
    /// `webhook_secret = None` accepts webhooks without verification.
    pub fn new(
        orders: Arc<dyn OrdersRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: NotificationDispatcher,
        webhook_secret: Option<String>,
    ) -> Self {
        let webhook_secret = webhook_secret.filter(|s| !s.is_empty());
        if webhook_secret.is_none() {
            warn!("Webhook secret not configured: webhook signatures will NOT be verified");
        }
        Self {
            orders,
            gateway,
            notifier,
            webhook_secret,
        }
    }

    /// Applies a guarded transition and notifies when this call won.
    async fn settle(
        &self,
        order_id: Uuid,
        update: StatusUpdate,
        channel: Channel,
    ) -> Result<Transition, RepositoryError> {
        let transition = self.orders.transition(order_id, &update).await?;
        match &transition {
            Transition::Applied(order) => {
                info!(
                    order_id = %order.id,
                    status = %order.status,
                    channel = channel.as_str(),
                    "Payment settled"
                );
                let event = match order.status {
                    OrderStatus::Confirmed => OrderEvent::PaymentConfirmed {
                        order: order.clone(),
                        channel,
                    },
                    _ => OrderEvent::PaymentFailed {
                        order: order.clone(),
                        channel,
                        reason: order
                            .meta
                            .failure_reason
                            .clone()
                            .unwrap_or_else(|| "Payment failed".to_string()),
                    },
                };
                self.notifier.dispatch(event);
            }
            Transition::Unchanged(order) => {
                check_payment_id(order, update.payment_id.as_deref(), channel);
            }
        }
        Ok(transition)
    }

    async fn confirm(
        &self,
        order_id: Uuid,
        payment_id: Option<String>,
        mut meta: PaymentMeta,
        channel: Channel,
    ) -> Result<Transition, RepositoryError> {
        meta.payment_id = payment_id.clone();
        meta.confirmed_at = Some(Utc::now());
        meta.resolved_via = Some(channel);
        self.settle(order_id, StatusUpdate::confirm_payment(payment_id, meta), channel)
            .await
    }

    async fn fail(
        &self,
        order_id: Uuid,
        reason: &str,
        mut meta: PaymentMeta,
        channel: Channel,
    ) -> Result<Transition, RepositoryError> {
        meta.failure_reason = Some(reason.to_string());
        meta.failed_at = Some(Utc::now());
        meta.resolved_via = Some(channel);
        self.settle(order_id, StatusUpdate::fail_payment(meta), channel)
            .await
    }

    /// Finds the order a webhook refers to: internal reference first, gateway order id second.
    async fn resolve_webhook_order(&self, event: &WebhookEvent) -> Result<Option<Order>, RepositoryError> {
        if let Some(id) = event.internal_order_ref().and_then(|r| r.parse::<Uuid>().ok()) {
            match self.orders.get_by_id(id).await {
                Ok(order) => return Ok(Some(order)),
                Err(RepositoryError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        if let Some(gateway_order_id) = event.gateway_order_id() {
            match self.orders.get_by_gateway_order_id(gateway_order_id).await {
                Ok(order) => return Ok(Some(order)),
                Err(RepositoryError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn process_webhook(&self, raw_body: &[u8]) -> Result<WebhookOutcome, ServiceError> {
        let event = WebhookEvent::parse(raw_body)
            .map_err(|e| ServiceError::Validation(format!("Malformed webhook payload: {e}")))?;
        let kind = event.kind();
        if kind == WebhookEventKind::Other {
            info!(event = %event.event, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored(event.event.clone()));
        }

        let Some(order) = self.resolve_webhook_order(&event).await? else {
            warn!(
                event = %event.event,
                gateway_order_id = ?event.gateway_order_id(),
                "Webhook does not match any order"
            );
            return Ok(WebhookOutcome::Unresolved);
        };

        let meta = PaymentMeta {
            webhook_event: Some(event.event.clone()),
            webhook_received_at: Some(Utc::now()),
            gateway_status: event.raw_status().map(String::from),
            ..Default::default()
        };
        let transition = if kind.is_success() {
            self.confirm(
                order.id,
                event.payment_id().map(String::from),
                meta,
                Channel::Webhook,
            )
            .await?
        } else {
            let reason = event.failure_reason().unwrap_or("Payment failed");
            self.fail(order.id, reason, meta, Channel::Webhook).await?
        };

        Ok(match transition {
            Transition::Applied(o) => WebhookOutcome::Applied {
                order_id: o.id,
                status: o.status,
            },
            Transition::Unchanged(o) => WebhookOutcome::AlreadyResolved {
                order_id: o.id,
                status: o.status,
            },
        })
    }

    /// Finds the order being polled; `order_ref` wins over the gateway order id.
    async fn resolve_polled_order(&self, gateway_order_id: &str, order_ref: Option<&str>) -> Result<Order, ServiceError> {
        match order_ref.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reference) => {
                let id = parse_order_id(reference)?;
                let order = self
                    .orders
                    .get_by_id(id)
                    .await
                    .map_err(|e| ServiceError::from_lookup(e, reference))?;
                if let Some(stored) = order.gateway_order_id.as_deref() {
                    if stored != gateway_order_id {
                        return Err(ServiceError::Validation(
                            "Payment reference does not match the order".into(),
                        ));
                    }
                }
                Ok(order)
            }
            None => self
                .orders
                .get_by_gateway_order_id(gateway_order_id)
                .await
                .map_err(|e| ServiceError::from_lookup(e, gateway_order_id)),
        }
    }
}

/// Logs when a second success report carries a different payment id than the one stored.
fn check_payment_id(order: &Order, reported: Option<&str>, channel: Channel) {
    if let (Some(stored), Some(reported)) = (order.payment_id.as_deref(), reported) {
        if stored != reported {
            warn!(
                order_id = %order.id,
                stored_payment_id = %stored,
                reported_payment_id = %reported,
                channel = channel.as_str(),
                "Conflicting payment id reported for a settled order; keeping the first"
            );
        }
    }
}

fn status_response(order: &Order, message: impl Into<String>) -> PaymentStatusResponse {
    PaymentStatusResponse {
        success: true,
        state: PaymentState::from_order_status(order.status),
        order_status: order.status,
        order_id: order.id,
        message: message.into(),
        payment_id: order.payment_id.clone(),
    }
}

fn state_message(order: &Order) -> &'static str {
    match PaymentState::from_order_status(order.status) {
        PaymentState::Completed => "Payment completed",
        PaymentState::Failed => "Payment failed",
        PaymentState::Pending => "Payment pending",
    }
}

fn verify_response(order: &Order) -> VerifyPaymentResponse {
    let paid = matches!(
        order.status,
        OrderStatus::Confirmed | OrderStatus::Shipped | OrderStatus::Fulfilled
    );
    let message = if paid {
        "Payment verified successfully"
    } else {
        "Order was already closed without payment; please contact support"
    };
    VerifyPaymentResponse {
        success: paid,
        message: message.to_string(),
        order_id: order.id,
        payment_id: order.payment_id.clone(),
        order_status: order.status,
    }
}

#[async_trait]
impl PaymentService for PaymentServiceImpl {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn initiate(&self, request: InitiatePaymentRequest) -> Result<InitiatePaymentResponse, ServiceError> {
        let id = parse_order_id(&request.order_id)?;
        let order = self
            .orders
            .get_by_id(id)
            .await
            .map_err(|e| ServiceError::from_lookup(e, &request.order_id))?;

        if order.status != OrderStatus::PendingPayment {
            return Err(ServiceError::InvalidOrderState(format!(
                "Order is {}, payment can only start for {} orders",
                order.status,
                OrderStatus::PendingPayment
            )));
        }
        if request.amount != order.total_amount {
            warn!(
                requested = request.amount,
                stored = order.total_amount,
                "Payment amount does not match order total"
            );
            return Err(ServiceError::Validation(
                "Amount does not match the order total".into(),
            ));
        }

        let mut notes = BTreeMap::new();
        notes.insert(NOTE_ORDER_ID.to_string(), order.id.to_string());
        notes.insert("customerPhone".to_string(), order.customer.phone.clone());
        notes.insert("customerName".to_string(), order.customer.name.clone());
        if let Some(email) = &order.customer.email {
            notes.insert("customerEmail".to_string(), email.clone());
        }
        let gateway_order = self
            .gateway
            .create_order(&CreateGatewayOrder {
                amount: order.total_amount,
                currency: CURRENCY.to_string(),
                receipt: order.id.to_string(),
                notes,
            })
            .await
            .inspect_err(|e| error!(error = %e, "Gateway order creation failed"))?;

        let meta = PaymentMeta {
            gateway_order_id: Some(gateway_order.id.clone()),
            gateway_order_created_at: Some(Utc::now()),
            gateway_status: Some("created".to_string()),
            ..Default::default()
        };
        let transition = self
            .orders
            .attach_gateway_order(order.id, &gateway_order.id, &meta)
            .await?;
        if let Transition::Unchanged(current) = transition {
            return Err(ServiceError::InvalidOrderState(format!(
                "Order is {}, payment can no longer start",
                current.status
            )));
        }

        info!(gateway_order_id = %gateway_order.id, "Payment initiated");
        Ok(InitiatePaymentResponse {
            gateway_order_id: gateway_order.id,
            gateway_key_id: self.gateway.key_id().to_string(),
            amount: order.total_amount,
            currency: CURRENCY.to_string(),
            order_id: order.id,
        })
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id, payment_id = %request.payment_id))]
    async fn verify(&self, request: VerifyPaymentRequest) -> Result<VerifyPaymentResponse, ServiceError> {
        if request.gateway_order_id.trim().is_empty()
            || request.payment_id.trim().is_empty()
            || request.signature.trim().is_empty()
        {
            return Err(ServiceError::Validation(
                "gatewayOrderId, paymentId and signature are required".into(),
            ));
        }
        let id = parse_order_id(&request.order_id)?;
        let order = self
            .orders
            .get_by_id(id)
            .await
            .map_err(|e| ServiceError::from_lookup(e, &request.order_id))?;

        // Signature first: a forged callback fails the order whatever it claims to pay for.
        if !self.gateway.verify_payment_signature(
            &request.gateway_order_id,
            &request.payment_id,
            &request.signature,
        ) {
            let meta = PaymentMeta {
                gateway_status: Some("signature_mismatch".to_string()),
                ..Default::default()
            };
            if let Err(e) = self
                .fail(order.id, SIGNATURE_FAILURE_REASON, meta, Channel::Verify)
                .await
            {
                error!(error = %e, "Failed to record signature mismatch");
            }
            return Err(ServiceError::SignatureMismatch);
        }

        if order.gateway_order_id.as_deref() != Some(request.gateway_order_id.as_str()) {
            warn!(
                submitted = %request.gateway_order_id,
                stored = ?order.gateway_order_id,
                "Verification for a gateway order that does not belong to this order"
            );
            return Err(ServiceError::Validation(
                "Payment does not belong to this order".into(),
            ));
        }

        let meta = PaymentMeta {
            signature_verified_at: Some(Utc::now()),
            ..Default::default()
        };
        let order = if order.status == OrderStatus::PendingPayment {
            self.confirm(order.id, Some(request.payment_id.clone()), meta, Channel::Verify)
                .await?
                .into_order()
        } else {
            check_payment_id(&order, Some(&request.payment_id), Channel::Verify);
            order
        };

        if order.status == OrderStatus::PaymentFailed {
            error!(
                order_id = %order.id,
                payment_id = %request.payment_id,
                "Valid payment received for an order already marked failed"
            );
        }
        Ok(verify_response(&order))
    }

    #[instrument(skip(self, raw_body, signature), fields(bytes = raw_body.len()))]
    async fn handle_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> Result<WebhookOutcome, ServiceError> {
        match &self.webhook_secret {
            Some(secret) => {
                let verified = signature
                    .map(|sig| verify_webhook_signature(raw_body, sig, secret))
                    .unwrap_or(false);
                if !verified {
                    warn!(signature_present = signature.is_some(), "Webhook signature rejected");
                    return Err(ServiceError::SignatureMismatch);
                }
            }
            None => warn!("Processing webhook WITHOUT signature verification"),
        }

        match self.process_webhook(raw_body).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(error = %e, "Webhook processing failed; acknowledging anyway");
                Ok(WebhookOutcome::Failed(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn poll_status(&self, gateway_order_id: &str, order_ref: Option<&str>) -> Result<PaymentStatusResponse, ServiceError> {
        let order = self.resolve_polled_order(gateway_order_id, order_ref).await?;

        if order.status != OrderStatus::PendingPayment {
            return Ok(status_response(&order, state_message(&order)));
        }

        // Only the gateway order recorded at initiation may settle this order.
        let Some(lookup_id) = order
            .gateway_order_id
            .as_deref()
            .filter(|stored| *stored == gateway_order_id)
        else {
            warn!(
                order_id = %order.id,
                polled = %gateway_order_id,
                "Poll for a gateway order not recorded on this order; reporting local state"
            );
            return Ok(status_response(&order, "Payment not started for this order"));
        };
        let remote = match self.gateway.fetch_order_status(lookup_id).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = %e, "Gateway status unavailable; reporting last known state");
                return Ok(status_response(
                    &order,
                    "Payment status temporarily unavailable; showing last known state",
                ));
            }
        };

        let meta = PaymentMeta {
            gateway_status: Some(remote.raw_status.clone()),
            last_polled_at: Some(Utc::now()),
            ..Default::default()
        };
        let settled = match remote.state {
            GatewayOrderState::Paid => {
                let payment = remote.successful_payment().or(remote.payments.first());
                if payment.is_none() {
                    warn!(order_id = %order.id, "Gateway reports paid without a payment entry");
                }
                let payment_id = payment.map(|p| p.id.clone());
                Some(self.confirm(order.id, payment_id, meta, Channel::Poll).await)
            }
            GatewayOrderState::Attempted if remote.all_attempts_failed() => {
                let reason = remote.last_failure_reason().unwrap_or("Payment failed");
                Some(self.fail(order.id, reason, meta, Channel::Poll).await)
            }
            _ => None,
        };

        match settled {
            Some(Ok(transition)) => {
                let order = transition.into_order();
                Ok(status_response(&order, state_message(&order)))
            }
            Some(Err(e)) => {
                error!(error = %e, "Failed to record polled payment state");
                Ok(status_response(&order, "Payment status could not be saved; showing last known state"))
            }
            None => Ok(status_response(&order, "Payment pending")),
        }
    }
}
