// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain model for store records.
//!
//! Identity is deterministic: the record id doubles as the Helm release
//! name, and the namespace is derived from the id. Status is a closed
//! state machine; every transition outside [`StoreStatus::can_transition_to`]
//! is rejected by the store of record.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Store names: lowercase DNS-label-ish, 3..=50 chars.
pub static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,48}[a-z0-9]$").expect("valid regex"));

const ID_SUFFIX_LEN: usize = 8;
const ID_SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Lifecycle state of a store.
///
/// ```text
///               create()
///                 |
///           PROVISIONING --worker success--> READY
///                 |                            |
///                 | worker failure             | delete()
///                 v                            v
///               FAILED --delete()--> DELETING --worker success--> DELETED
///                                      ^
///                                      +-- from READY
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum StoreStatus {
    Provisioning,
    Ready,
    Failed,
    Deleting,
    Deleted,
}

impl StoreStatus {
    /// Whether a record in `self` may move to `next`.
    pub fn can_transition_to(self, next: StoreStatus) -> bool {
        matches!(
            (self, next),
            (StoreStatus::Provisioning, StoreStatus::Ready)
                | (StoreStatus::Provisioning, StoreStatus::Failed)
                | (StoreStatus::Ready, StoreStatus::Deleting)
                | (StoreStatus::Failed, StoreStatus::Deleting)
                | (StoreStatus::Deleting, StoreStatus::Deleted)
        )
    }

    /// The set of statuses a record must currently hold for a move to
    /// `target` to be legal. Empty for `Provisioning`: it is only ever
    /// entered at creation.
    pub fn legal_priors(target: StoreStatus) -> &'static [StoreStatus] {
        match target {
            StoreStatus::Provisioning => &[],
            StoreStatus::Ready => &[StoreStatus::Provisioning],
            StoreStatus::Failed => &[StoreStatus::Provisioning],
            StoreStatus::Deleting => &[StoreStatus::Ready, StoreStatus::Failed],
            StoreStatus::Deleted => &[StoreStatus::Deleting],
        }
    }

    /// True for `PROVISIONING` and `DELETING`: states the worker still owes
    /// work to. Recovery re-enqueues exactly these on startup.
    pub fn is_non_terminal(self) -> bool {
        matches!(self, StoreStatus::Provisioning | StoreStatus::Deleting)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StoreStatus::Provisioning => "PROVISIONING",
            StoreStatus::Ready => "READY",
            StoreStatus::Failed => "FAILED",
            StoreStatus::Deleting => "DELETING",
            StoreStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ecommerce engine backing a store.
///
/// `medusa` is accepted at the API boundary; the Helm chart may still
/// reject it at install time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Engine {
    Woocommerce,
    Medusa,
}

impl Engine {
    pub fn as_str(self) -> &'static str {
        match self {
            Engine::Woocommerce => "woocommerce",
            Engine::Medusa => "medusa",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "woocommerce" => Ok(Engine::Woocommerce),
            "medusa" => Ok(Engine::Medusa),
            other => Err(format!("unknown engine '{other}'")),
        }
    }
}

/// A store record as persisted in the `stores` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoreRecord {
    /// Opaque identifier, `<name>-<rand8>`. Doubles as the Helm release name.
    pub id: String,
    /// User-supplied label, unique across non-DELETED rows.
    pub name: String,
    /// Ecommerce engine.
    pub engine: Engine,
    /// Kubernetes namespace, always `store-<id>`.
    pub namespace: String,
    /// Helm release name, always equal to `id`.
    pub helm_release: String,
    /// Current lifecycle state.
    pub status: StoreStatus,
    /// Public URL; populated iff `status == READY`.
    pub store_url: Option<String>,
    /// Human-readable reason; populated iff `status == FAILED`.
    pub failure_reason: Option<String>,
    /// Admin credentials passed through to the Helm chart. The password is
    /// write-only at the API boundary and never serialized into responses.
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Advances on every mutation.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a store record.
#[derive(Debug, Clone)]
pub struct NewStore {
    pub name: String,
    pub engine: Engine,
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
}

/// Generate a store id: the name plus an 8-char lowercase alphanumeric
/// suffix. Collisions are vanishingly rare; the store retries insertion a
/// few times anyway.
pub fn generate_store_id(name: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_SUFFIX_CHARSET[rng.gen_range(0..ID_SUFFIX_CHARSET.len())] as char)
        .collect();
    format!("{name}-{suffix}")
}

/// Namespace for a store id. Deterministic so crash recovery can re-derive
/// every external identifier from the record alone.
pub fn namespace_for(id: &str) -> String {
    format!("store-{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_graph_matches_lifecycle() {
        use StoreStatus::*;

        let all = [Provisioning, Ready, Failed, Deleting, Deleted];
        let legal = [
            (Provisioning, Ready),
            (Provisioning, Failed),
            (Ready, Deleting),
            (Failed, Deleting),
            (Deleting, Deleted),
        ];

        for from in all {
            for to in all {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "transition {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn legal_priors_agree_with_graph() {
        use StoreStatus::*;

        for target in [Provisioning, Ready, Failed, Deleting, Deleted] {
            for prior in StoreStatus::legal_priors(target) {
                assert!(prior.can_transition_to(target));
            }
        }
        assert!(StoreStatus::legal_priors(Provisioning).is_empty());
    }

    #[test]
    fn non_terminal_statuses() {
        assert!(StoreStatus::Provisioning.is_non_terminal());
        assert!(StoreStatus::Deleting.is_non_terminal());
        assert!(!StoreStatus::Ready.is_non_terminal());
        assert!(!StoreStatus::Failed.is_non_terminal());
        assert!(!StoreStatus::Deleted.is_non_terminal());
    }

    #[test]
    fn name_pattern_accepts_dns_labels() {
        for ok in ["shop", "my-store", "a1b", "store-42"] {
            assert!(NAME_PATTERN.is_match(ok), "{ok} should be valid");
        }
        for bad in ["ab", "-shop", "shop-", "Shop", "my_store", ""] {
            assert!(!NAME_PATTERN.is_match(bad), "{bad} should be invalid");
        }
        let max = format!("a{}a", "b".repeat(48));
        assert!(NAME_PATTERN.is_match(&max));
        let too_long = format!("a{}a", "b".repeat(49));
        assert!(!NAME_PATTERN.is_match(&too_long));
    }

    #[test]
    fn generated_ids_are_deterministic_in_shape() {
        let id = generate_store_id("shop");
        assert!(id.starts_with("shop-"));
        let suffix = &id["shop-".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );

        assert_eq!(namespace_for(&id), format!("store-{id}"));
    }

    #[test]
    fn engine_round_trips() {
        assert_eq!("woocommerce".parse::<Engine>(), Ok(Engine::Woocommerce));
        assert_eq!("medusa".parse::<Engine>(), Ok(Engine::Medusa));
        assert!("shopify".parse::<Engine>().is_err());
        assert_eq!(Engine::Woocommerce.to_string(), "woocommerce");
    }
}
