//! Single-shipment dispatcher and vendor actions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use fdk_db::DispatchStore;
use fdk_lifecycle::Event;
use fdk_notify::{push_all, Notification, Notifier};
use fdk_schemas::Shipment;

use crate::DispatchError;

pub struct DispatchService<S> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S: DispatchStore> DispatchService<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Dispatcher re-offers a shipment straight to grade A, skipping the
    /// round allocator. All active grade-A vendors are notified.
    pub async fn request_booking(
        &self,
        shipid: &str,
        dispatcher: &str,
        now: DateTime<Utc>,
    ) -> Result<Shipment, DispatchError> {
        let shipment = self
            .store
            .apply_event(
                shipid,
                &Event::RequestBooking {
                    dispatcher: dispatcher.to_string(),
                },
                now,
            )
            .await?;

        info!(shipid, dispatcher, "booking requested");
        let tokens = self
            .store
            .vendor_tokens_by_grade(fdk_schemas::Grade::A)
            .await?;
        push_all(
            self.notifier.as_ref(),
            &tokens,
            &Notification::new(
                "New booking request",
                format!("Shipment {} is waiting for confirmation", shipid),
            )
            .with_data("shipid", shipid),
        )
        .await;

        Ok(shipment)
    }

    /// Vendor claims a shipment with a specific truck. Ownership and
    /// availability are verified inside the store transaction; on success
    /// every dispatcher is notified.
    pub async fn vendor_confirm(
        &self,
        vencode: &str,
        shipid: &str,
        carlicense: &str,
        carnote: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Shipment, DispatchError> {
        let vendor = self
            .store
            .get_vendor(vencode)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("vendor {} not found", vencode)))?;

        let shipment = self
            .store
            .apply_event(
                shipid,
                &Event::VendorConfirm {
                    vencode: vencode.to_string(),
                    grade: vendor.grade,
                    carlicense: carlicense.to_string(),
                    carnote,
                },
                now,
            )
            .await?;

        info!(shipid, vencode, carlicense, "vendor confirmed");
        let tokens = self.store.dispatcher_tokens().await?;
        push_all(
            self.notifier.as_ref(),
            &tokens,
            &Notification::new(
                "Shipment confirmed",
                format!("Shipment {} confirmed by {}", shipid, vendor.venname),
            )
            .with_data("shipid", shipid)
            .with_data("vencode", vencode),
        )
        .await;

        Ok(shipment)
    }

    /// Vendor declines its offered shipment. The shipment opens to all
    /// other vendors, who are notified of the broadcast.
    pub async fn vendor_reject(
        &self,
        vencode: &str,
        shipid: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Shipment, DispatchError> {
        let vendor = self
            .store
            .get_vendor(vencode)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("vendor {} not found", vencode)))?;

        let shipment = self
            .store
            .apply_event(
                shipid,
                &Event::VendorReject {
                    vencode: vencode.to_string(),
                    grade: vendor.grade,
                },
                now,
            )
            .await?;

        info!(shipid, vencode, reason, "vendor rejected");
        let tokens = self.store.vendor_tokens_except(vencode).await?;
        push_all(
            self.notifier.as_ref(),
            &tokens,
            &Notification::new(
                "Shipment open for booking",
                format!("Shipment {} is open for any vendor", shipid),
            )
            .with_data("shipid", shipid),
        )
        .await;

        Ok(shipment)
    }

    /// Dispatcher cancels a confirmed or assigned shipment before its
    /// appointment. The vendor that held it is notified. The reserved
    /// truck's blocked-until date is intentionally left in place.
    pub async fn cancel(
        &self,
        shipid: &str,
        dispatcher: &str,
        now: DateTime<Utc>,
    ) -> Result<Shipment, DispatchError> {
        let prior_vencode = self
            .store
            .get_shipment(shipid)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("shipment {} not found", shipid)))?
            .vencode;

        let shipment = self
            .store
            .apply_event(
                shipid,
                &Event::Cancel {
                    dispatcher: dispatcher.to_string(),
                },
                now,
            )
            .await?;

        info!(shipid, dispatcher, "shipment canceled");
        if let Some(vencode) = prior_vencode {
            if let Some(token) = self.store.token_for_vencode(&vencode).await? {
                push_all(
                    self.notifier.as_ref(),
                    &[token],
                    &Notification::new(
                        "Shipment canceled",
                        format!("Shipment {} was canceled by the dispatcher", shipid),
                    )
                    .with_data("shipid", shipid),
                )
                .await;
            }
        }

        Ok(shipment)
    }

    /// Dispatcher hands a shipment directly to a chosen vendor.
    pub async fn manual_assign(
        &self,
        shipid: &str,
        vencode: &str,
        dispatcher: &str,
        now: DateTime<Utc>,
    ) -> Result<Shipment, DispatchError> {
        let vendor = self
            .store
            .get_vendor(vencode)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("vendor {} not found", vencode)))?;

        let shipment = self
            .store
            .apply_event(
                shipid,
                &Event::ManualAssign {
                    vencode: vencode.to_string(),
                    grade: vendor.grade,
                    dispatcher: dispatcher.to_string(),
                },
                now,
            )
            .await?;

        info!(shipid, vencode, dispatcher, "manually assigned");
        if let Some(token) = self.store.token_for_vencode(vencode).await? {
            push_all(
                self.notifier.as_ref(),
                &[token],
                &Notification::new(
                    "Shipment assigned to you",
                    format!("Shipment {} was assigned to you by the dispatcher", shipid),
                )
                .with_data("shipid", shipid),
            )
            .await;
        }

        Ok(shipment)
    }

    /// Toggle the dispatcher hold. A request that matches the current hold
    /// state is an idempotent no-op.
    pub async fn set_hold(
        &self,
        shipid: &str,
        hold: bool,
        dispatcher: &str,
        now: DateTime<Utc>,
    ) -> Result<Shipment, DispatchError> {
        let current = self
            .store
            .get_shipment(shipid)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("shipment {} not found", shipid)))?;
        if current.is_on_hold == hold {
            return Ok(current);
        }

        let event = if hold {
            Event::Hold {
                dispatcher: dispatcher.to_string(),
            }
        } else {
            Event::Unhold {
                dispatcher: dispatcher.to_string(),
            }
        };
        let shipment = self.store.apply_event(shipid, &event, now).await?;
        info!(shipid, hold, dispatcher, "hold toggled");
        Ok(shipment)
    }
}
