use crate::config::AppConfig;
use crate::db::DbPool;
use crate::entities::{Address, AddressModel, OrderModel, PaymentMethod, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::orders::{OrderService, PlaceOrderInput};
use crate::services::payments::PaymentGateway;
use crate::services::pricing::{self, PricedLine, PricingBreakdown};
use crate::services::validation::{CartValidator, RemovedItem};
use crate::services::wallet::WalletService;
use sea_orm::EntityTrait;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// What the buyer gets back from a checkout attempt.
#[derive(Debug)]
pub enum CheckoutOutcome {
    Placed(OrderModel),
    /// The validation pass dropped lines; nothing was ordered and the buyer
    /// is sent back to review the revised cart.
    CartRevised { removed: Vec<RemovedItem> },
}

/// A PayPal order pair: theirs and ours.
#[derive(Debug)]
pub enum PaypalCreateOutcome {
    Created {
        paypal_order_id: String,
        order_id: Uuid,
        approve_url: Option<String>,
    },
    CartRevised { removed: Vec<RemovedItem> },
}

/// Where to send the buyer after a successful capture.
#[derive(Debug)]
pub struct PaypalCaptureResult {
    pub order_id: Uuid,
    pub redirect: String,
}

struct PreparedCart {
    lines: Vec<PricedLine>,
    totals: PricingBreakdown,
}

enum Prepared {
    Ready(PreparedCart),
    Revised(Vec<RemovedItem>),
}

/// Orchestrates checkout: validation, pricing, the order write and payment
/// settlement, in that order. Owns no state of its own.
pub struct CheckoutService {
    db: Arc<DbPool>,
    config: Arc<AppConfig>,
    validator: Arc<CartValidator>,
    orders: Arc<OrderService>,
    wallet: Arc<WalletService>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    event_sender: Arc<EventSender>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DbPool>,
        config: Arc<AppConfig>,
        validator: Arc<CartValidator>,
        orders: Arc<OrderService>,
        wallet: Arc<WalletService>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            config,
            validator,
            orders,
            wallet,
            gateway,
            event_sender,
        }
    }

    /// Places an order paid by wallet, card or cash-on-delivery. PayPal goes
    /// through `create_paypal_order`/`capture_paypal_order` instead.
    #[instrument(skip(self, notes))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        payment_method: PaymentMethod,
        shipping_address_id: Uuid,
        billing_address_id: Uuid,
        notes: Option<String>,
    ) -> Result<CheckoutOutcome, ServiceError> {
        if payment_method == PaymentMethod::Paypal {
            return Err(ServiceError::InvalidOperation(
                "PayPal orders are created through the PayPal checkout endpoints".to_string(),
            ));
        }
        self.ensure_method_enabled(payment_method)?;
        self.ensure_address_owner(shipping_address_id, user_id)
            .await?;
        self.ensure_address_owner(billing_address_id, user_id)
            .await?;

        let prepared = match self.prepare(user_id).await? {
            Prepared::Ready(prepared) => prepared,
            Prepared::Revised(removed) => return Ok(CheckoutOutcome::CartRevised { removed }),
        };

        // Early balance check saves a doomed transaction; the debit itself
        // re-verifies under the transaction either way.
        if payment_method == PaymentMethod::Wallet
            && self.wallet.balance(user_id).await? < prepared.totals.total_amount
        {
            return Err(ServiceError::InsufficientBalance);
        }

        if payment_method == PaymentMethod::Card {
            // Card settlement is not wired to a processor; orders are
            // accepted and left pending for manual settlement.
            warn!(%user_id, "card payment accepted without settlement");
        }

        let order = self
            .orders
            .place_order(PlaceOrderInput {
                user_id,
                lines: prepared.lines,
                totals: prepared.totals,
                payment_method,
                shipping_address_id,
                billing_address_id,
                notes,
            })
            .await?;

        Ok(CheckoutOutcome::Placed(order))
    }

    /// Places a pending PayPal order locally, then creates the matching
    /// gateway order. If the gateway call fails the local order is cancelled
    /// and restocked before the error surfaces.
    #[instrument(skip(self, notes))]
    pub async fn create_paypal_order(
        &self,
        user_id: Uuid,
        shipping_address_id: Uuid,
        billing_address_id: Uuid,
        notes: Option<String>,
    ) -> Result<PaypalCreateOutcome, ServiceError> {
        self.ensure_method_enabled(PaymentMethod::Paypal)?;
        let gateway = self.gateway.clone().ok_or_else(|| {
            ServiceError::InvalidOperation("PayPal is not configured".to_string())
        })?;
        self.ensure_address_owner(shipping_address_id, user_id)
            .await?;
        self.ensure_address_owner(billing_address_id, user_id)
            .await?;

        let prepared = match self.prepare(user_id).await? {
            Prepared::Ready(prepared) => prepared,
            Prepared::Revised(removed) => return Ok(PaypalCreateOutcome::CartRevised { removed }),
        };

        let order = self
            .orders
            .place_order(PlaceOrderInput {
                user_id,
                lines: prepared.lines,
                totals: prepared.totals,
                payment_method: PaymentMethod::Paypal,
                shipping_address_id,
                billing_address_id,
                notes,
            })
            .await?;

        let gateway_order = match gateway
            .create_order(
                order.total_amount,
                &self.config.paypal.currency,
                &order.order_number,
            )
            .await
        {
            Ok(created) => created,
            Err(err) => {
                if let Err(cancel_err) = self
                    .orders
                    .cancel_and_restock(order.id, "paypal order creation failed")
                    .await
                {
                    warn!(order_id = %order.id, error = %cancel_err, "failed to cancel order after gateway error");
                }
                return Err(err);
            }
        };

        self.orders
            .set_paypal_order_id(order.id, &gateway_order.id)
            .await?;
        self.event_sender
            .send_or_log(Event::PaypalOrderCreated {
                order_id: order.id,
                paypal_order_id: gateway_order.id.clone(),
            })
            .await;

        Ok(PaypalCreateOutcome::Created {
            paypal_order_id: gateway_order.id,
            order_id: order.id,
            approve_url: gateway_order.approve_url,
        })
    }

    /// Captures an approved PayPal order and marks ours paid. Safe to call
    /// twice: an already-paid order short-circuits to the same redirect.
    #[instrument(skip(self))]
    pub async fn capture_paypal_order(
        &self,
        user_id: Uuid,
        paypal_order_id: &str,
        order_id: Uuid,
    ) -> Result<PaypalCaptureResult, ServiceError> {
        let gateway = self.gateway.clone().ok_or_else(|| {
            ServiceError::InvalidOperation("PayPal is not configured".to_string())
        })?;

        let (order, _) = self.orders.get_order(order_id).await?;
        if order.user_id != user_id {
            return Err(ServiceError::ValidationError(
                "Order does not belong to this user".to_string(),
            ));
        }
        if order.paypal_order_id.as_deref() != Some(paypal_order_id) {
            return Err(ServiceError::Conflict(
                "PayPal order does not match this order".to_string(),
            ));
        }

        if order.payment_status == PaymentStatus::Paid {
            return Ok(PaypalCaptureResult {
                order_id,
                redirect: confirmation_redirect(order_id),
            });
        }

        let outcome = match gateway.capture_order(paypal_order_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.event_sender
                    .send_or_log(Event::PaypalCaptureFailed {
                        order_id,
                        message: err.to_string(),
                    })
                    .await;
                return Err(err);
            }
        };

        if !outcome.is_completed() {
            let message = format!("PayPal capture ended in status {}", outcome.status);
            self.event_sender
                .send_or_log(Event::PaypalCaptureFailed {
                    order_id,
                    message: message.clone(),
                })
                .await;
            return Err(ServiceError::PaymentFailed(message));
        }

        if !self.orders.mark_paid(order_id).await? {
            // The guard lost: either a concurrent capture already settled
            // the order, or the sweep cancelled it while the gateway call
            // was in flight. A cancelled order has its stock back on the
            // shelf, so the captured money must go back too.
            let (order, _) = self.orders.get_order(order_id).await?;
            if order.payment_status != PaymentStatus::Paid {
                let message =
                    "Order was cancelled before the capture completed; the payment will be refunded"
                        .to_string();
                warn!(%order_id, %paypal_order_id, "capture landed on a cancelled order");
                self.event_sender
                    .send_or_log(Event::PaypalCaptureFailed {
                        order_id,
                        message: message.clone(),
                    })
                    .await;
                return Err(ServiceError::Conflict(message));
            }
        }

        Ok(PaypalCaptureResult {
            order_id,
            redirect: confirmation_redirect(order_id),
        })
    }

    async fn prepare(&self, user_id: Uuid) -> Result<Prepared, ServiceError> {
        let validated = self.validator.validate(user_id).await?;
        if validated.was_revised() {
            return Ok(Prepared::Revised(validated.removed));
        }
        if validated.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        let totals = pricing::price_cart(&validated.lines, &self.config.checkout);
        Ok(Prepared::Ready(PreparedCart {
            lines: validated.lines,
            totals,
        }))
    }

    fn ensure_method_enabled(&self, method: PaymentMethod) -> Result<(), ServiceError> {
        if self.config.method_enabled(method) {
            Ok(())
        } else {
            Err(ServiceError::InvalidOperation(
                "Payment method is not available".to_string(),
            ))
        }
    }

    async fn ensure_address_owner(
        &self,
        address_id: Uuid,
        user_id: Uuid,
    ) -> Result<AddressModel, ServiceError> {
        let address = Address::find_by_id(address_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", address_id)))?;
        if address.user_id != user_id {
            return Err(ServiceError::ValidationError(
                "Address does not belong to this user".to_string(),
            ));
        }
        Ok(address)
    }
}

/// Buyer-facing confirmation path included in PayPal capture responses.
pub fn confirmation_redirect(order_id: Uuid) -> String {
    format!("/order-confirmation/{}", order_id)
}
