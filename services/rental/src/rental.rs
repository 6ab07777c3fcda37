//! Rental request coordinator
//!
//! A rental is a two-step handshake. `request_rental` reserves a box under
//! a fresh claim code and hands back the code rendered as a QR artifact.
//! `redeem` turns a live claim into a committed rental for the logged-in
//! user. Each claim is single-shot: it ends redeemed, expired or rejected.
//! The box registry has the final word. A claim only proves someone asked,
//! and the commit succeeds only if the box still has no renter.

use common::error::StoreError;
use rand::{Rng, distributions::Alphanumeric, rngs::OsRng};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    models::CommitOutcome,
    notify::{Notifier, RentalEvent},
    qr::{EncodeError, QrArtifact, QrEncoder},
    repositories::{BoxLookupError, BoxStore},
    reservation::{Lookup, ReservationTable},
    session::SessionManager,
};

/// Length of a claim code drawn from `[A-Za-z0-9]` (about 143 bits)
pub const CLAIM_CODE_LEN: usize = 24;

#[derive(Error, Debug)]
pub enum RentalError {
    #[error("unknown box '{0}'")]
    UnknownBox(String),

    #[error("box '{0}' is already rented")]
    AlreadyRented(String),

    #[error("claim code is invalid or expired")]
    InvalidOrExpiredToken,

    #[error("not logged in")]
    Unauthenticated,

    /// Another claim on the same box committed first
    #[error("box '{0}' was rented by someone else first")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Encoding(#[from] EncodeError),
}

impl From<BoxLookupError> for RentalError {
    fn from(err: BoxLookupError) -> Self {
        match err {
            BoxLookupError::NotFound(code) => RentalError::UnknownBox(code),
            BoxLookupError::Store(e) => RentalError::Store(e),
        }
    }
}

/// What a successful rental request hands back
#[derive(Debug, Clone)]
pub struct RentalTicket {
    pub claim_code: String,
    pub artifact: QrArtifact,
}

/// A committed rental
#[derive(Debug, Clone, PartialEq)]
pub struct Redemption {
    pub username: String,
    pub box_code: String,
}

#[derive(Clone)]
pub struct RentalCoordinator {
    boxes: Arc<dyn BoxStore>,
    sessions: SessionManager,
    reservations: ReservationTable,
    encoder: Arc<dyn QrEncoder>,
    notifier: Notifier,
}

impl RentalCoordinator {
    pub fn new(
        boxes: Arc<dyn BoxStore>,
        sessions: SessionManager,
        reservations: ReservationTable,
        encoder: Arc<dyn QrEncoder>,
        notifier: Notifier,
    ) -> Self {
        Self {
            boxes,
            sessions,
            reservations,
            encoder,
            notifier,
        }
    }

    /// Reserve a box and mint a claim code for it
    pub async fn request_rental(&self, box_code: &str) -> Result<RentalTicket, RentalError> {
        if self.boxes.is_rented(box_code).await? {
            return Err(RentalError::AlreadyRented(box_code.to_string()));
        }

        let claim_code = generate_claim_code();
        let artifact = self.encoder.encode(&claim_code).map_err(|e| {
            error!("Failed to render claim code for box {}: {}", box_code, e);
            e
        })?;

        self.reservations.insert(&claim_code, box_code).await;
        info!("Reserved box {} for {:?}", box_code, self.reservations.window());

        Ok(RentalTicket {
            claim_code,
            artifact,
        })
    }

    /// Redeem a claim code on behalf of the session's user
    pub async fn redeem(
        &self,
        claim_code: &str,
        session_token: Option<&str>,
    ) -> Result<Redemption, RentalError> {
        match self.reservations.check(claim_code).await {
            Lookup::Live(_) => {}
            Lookup::Expired => {
                debug!("Claim code redeemed after its window");
                return Err(RentalError::InvalidOrExpiredToken);
            }
            Lookup::Missing => return Err(RentalError::InvalidOrExpiredToken),
        }

        // The claim stays in place when the caller is not logged in, so a
        // retry with a valid session inside the window still works.
        let username = self
            .sessions
            .authenticate(session_token)
            .await?
            .ok_or(RentalError::Unauthenticated)?;

        let Some(reservation) = self.reservations.take(claim_code).await else {
            return Err(RentalError::InvalidOrExpiredToken);
        };
        let box_code = reservation.box_code.clone();

        match self.boxes.commit_rental(&username, &box_code).await {
            Ok(CommitOutcome::Committed) => {
                info!("Box {} rented by {}", box_code, username);
                self.notifier.notify(RentalEvent::new(&username, &box_code));
                Ok(Redemption { username, box_code })
            }
            Ok(CommitOutcome::AlreadyRented) => {
                warn!("{} lost the race for box {}", username, box_code);
                Err(RentalError::Conflict(box_code))
            }
            Ok(CommitOutcome::NotFound) => Err(RentalError::UnknownBox(box_code)),
            Err(e) => {
                self.reservations.restore(claim_code, reservation).await;
                Err(RentalError::Store(e))
            }
        }
    }

    /// Drop reservations whose window has passed
    pub async fn purge_expired(&self) -> usize {
        self.reservations.purge_expired().await
    }
}

fn generate_claim_code() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(CLAIM_CODE_LEN)
        .map(char::from)
        .collect()
}
