//! Sessions d'administration
//!
//! Une unique clé d'admin partagée, échangée contre un jeton de session
//! opaque posé en cookie. Chaque tentative de connexion paie un délai fixe
//! et une seule tentative est admise à la fois : la clé ne peut pas être
//! forcée en rafale.

use rand::Rng;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Cookie portant le jeton de session admin.
pub const TOKEN_COOKIE: &str = "pmoarchive_admin_token";

/// Délai payé par toute tentative de connexion, bonne ou mauvaise.
const SIGN_IN_DELAY: Duration = Duration::from_secs(3);

/// Issue d'une tentative de connexion.
#[derive(Debug, PartialEq, Eq)]
pub enum SignInOutcome {
    /// Clé acceptée ; le jeton est à poser en cookie.
    Accepted(String),
    /// Clé refusée.
    Rejected,
    /// Une autre tentative est déjà en cours.
    Busy,
}

pub struct AuthEngine {
    admin_key: String,
    busy: AtomicBool,
    tokens: Mutex<HashSet<String>>,
}

impl AuthEngine {
    pub fn new(admin_key: impl Into<String>) -> Self {
        AuthEngine {
            admin_key: admin_key.into(),
            busy: AtomicBool::new(false),
            tokens: Mutex::new(HashSet::new()),
        }
    }

    /// Tente une connexion admin. Une seule tentative à la fois, délai
    /// fixe dans tous les cas.
    pub async fn sign_in(&self, key: &str) -> SignInOutcome {
        if self.busy.swap(true, Ordering::SeqCst) {
            return SignInOutcome::Busy;
        }
        tokio::time::sleep(SIGN_IN_DELAY).await;
        let outcome = if key == self.admin_key {
            let token = random_token();
            self.tokens
                .lock()
                .expect("token lock poisoned")
                .insert(token.clone());
            info!("admin session opened");
            SignInOutcome::Accepted(token)
        } else {
            warn!("admin sign-in rejected");
            SignInOutcome::Rejected
        };
        self.busy.store(false, Ordering::SeqCst);
        outcome
    }

    /// Invalide un jeton de session.
    pub fn sign_out(&self, token: &str) {
        self.tokens.lock().expect("token lock poisoned").remove(token);
    }

    pub fn is_authorized(&self, token: Option<&str>) -> bool {
        match token {
            Some(token) => self
                .tokens
                .lock()
                .expect("token lock poisoned")
                .contains(token),
            None => false,
        }
    }
}

fn random_token() -> String {
    let mut rng = rand::rng();
    (0..32)
        .map(|_| char::from_digit(rng.random_range(0..16), 16).unwrap_or('0'))
        .collect()
}
