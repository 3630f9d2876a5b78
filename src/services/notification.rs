//! Notifications and web push
//!
//! In-app notifications are stored first; every push subscription of the
//! recipient is then notified on a background task so a slow or broken
//! push endpoint never delays the request that caused the notification.
//!
//! Delivery to browser push services is not implemented. The payload each
//! subscription would receive is built and logged at debug level, and
//! nothing leaves the process.

use crate::config::PushConfig;
use crate::db::repositories::{NotificationRepository, PushSubscriptionRepository};
use crate::models::{ListParams, NewNotification, Notification, PagedResult, PushSubscription};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Error types for notification operations
#[derive(Debug, thiserror::Error)]
pub enum NotificationServiceError {
    #[error("Notification not found")]
    NotFound,

    #[error("Not allowed to modify this notification")]
    Forbidden,

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// No VAPID public key configured
    #[error("Push notifications are not configured")]
    PushNotConfigured,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// The two browser keys needed to encrypt a push payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Extract push keys from any of the shapes browsers and clients send:
/// `{p256dh, auth}`, `{keys: {...}}` or `{subscription: {keys: {...}}}`.
pub fn parse_push_keys(raw: &str) -> Option<PushKeys> {
    let node: Value = serde_json::from_str(raw).ok()?;

    let keys = if node.get("p256dh").is_some() && node.get("auth").is_some() {
        &node
    } else if let Some(keys) = node.get("keys") {
        keys
    } else {
        node.get("subscription")?.get("keys")?
    };

    Some(PushKeys {
        p256dh: keys.get("p256dh")?.as_str()?.to_string(),
        auth: keys.get("auth")?.as_str()?.to_string(),
    })
}

/// Builds push messages for stored subscriptions
#[derive(Clone)]
struct PushDispatcher {
    enabled: bool,
    subject: String,
}

impl PushDispatcher {
    fn new(config: &PushConfig) -> Self {
        let enabled = config.vapid_public_key.as_deref().is_some_and(|k| !k.trim().is_empty())
            && config.vapid_private_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if !enabled {
            tracing::warn!("VAPID keys not configured - push payloads will not be prepared");
        }
        Self {
            enabled,
            subject: config
                .subject
                .clone()
                .unwrap_or_else(|| "mailto:admin@volunteerhub.local".to_string()),
        }
    }

    /// Payload for one subscription, or `None` when push is disabled or the
    /// subscription lacks keys. The payload is not delivered.
    fn prepare(&self, subscription: &PushSubscription, notification: &Notification) -> Option<String> {
        if !self.enabled {
            tracing::debug!("Push disabled, skipping {}", subscription.endpoint);
            return None;
        }
        if parse_push_keys(&subscription.keys_json).is_none() {
            tracing::warn!(
                "Subscription {} is missing p256dh/auth keys",
                subscription.id
            );
            return None;
        }

        let payload = push_payload(notification);
        tracing::debug!(
            endpoint = %subscription.endpoint,
            subject = %self.subject,
            bytes = payload.len(),
            "Push payload prepared, delivery to push services is not implemented"
        );
        Some(payload)
    }
}

fn push_payload(notification: &Notification) -> String {
    json!({
        "title": notification.title,
        "message": notification.message.as_deref().unwrap_or_default(),
        "url": notification.link.as_deref().unwrap_or_default(),
        "payload": notification.payload.as_deref().unwrap_or_default(),
    })
    .to_string()
}

/// Notification service
pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
    subscriptions: Arc<dyn PushSubscriptionRepository>,
    vapid_public_key: Option<String>,
    dispatcher: PushDispatcher,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        subscriptions: Arc<dyn PushSubscriptionRepository>,
        push: &PushConfig,
    ) -> Self {
        Self {
            notifications,
            subscriptions,
            vapid_public_key: push
                .vapid_public_key
                .clone()
                .filter(|k| !k.trim().is_empty()),
            dispatcher: PushDispatcher::new(push),
        }
    }

    /// Store a notification and push it to the user's subscriptions in the
    /// background.
    pub async fn notify(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, NotificationServiceError> {
        if notification.title.trim().is_empty() {
            return Err(NotificationServiceError::ValidationError(
                "Title is required".to_string(),
            ));
        }

        let created = self
            .notifications
            .create(&notification)
            .await
            .context("Failed to create notification")?;

        let subscriptions = self.subscriptions.clone();
        let dispatcher = self.dispatcher.clone();
        let pushed = created.clone();
        tokio::spawn(async move {
            match subscriptions.list_for_user(pushed.user_id).await {
                Ok(subs) => {
                    for sub in &subs {
                        dispatcher.prepare(sub, &pushed);
                    }
                }
                Err(e) => tracing::warn!("Failed to load push subscriptions: {:#}", e),
            }
        });

        Ok(created)
    }

    /// Like [`notify`](Self::notify) but only logs failures. Used where a
    /// notification is a side effect of another operation.
    pub async fn notify_quietly(&self, notification: NewNotification) {
        let kind = notification.kind.clone();
        if let Err(e) = self.notify(notification).await {
            tracing::warn!("Failed to send '{}' notification: {}", kind, e);
        }
    }

    /// Notifications of a user, newest first
    pub async fn list(
        &self,
        user_id: i64,
        unread_only: bool,
        params: &ListParams,
    ) -> Result<PagedResult<Notification>, NotificationServiceError> {
        let (items, total) = self
            .notifications
            .list_for_user(user_id, unread_only, params)
            .await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn unread_count(&self, user_id: i64) -> Result<i64, NotificationServiceError> {
        Ok(self.notifications.count_unread(user_id).await?)
    }

    /// Mark one notification read; only its recipient may do so
    pub async fn mark_read(&self, user_id: i64, id: i64) -> Result<(), NotificationServiceError> {
        let notification = self
            .notifications
            .get_by_id(id)
            .await?
            .ok_or(NotificationServiceError::NotFound)?;
        if notification.user_id != user_id {
            return Err(NotificationServiceError::Forbidden);
        }
        self.notifications.mark_read(id).await?;
        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: i64) -> Result<u64, NotificationServiceError> {
        Ok(self.notifications.mark_all_read(user_id).await?)
    }

    /// Public VAPID key handed to browsers
    pub fn vapid_public_key(&self) -> Result<&str, NotificationServiceError> {
        self.vapid_public_key
            .as_deref()
            .ok_or(NotificationServiceError::PushNotConfigured)
    }

    /// Register or refresh a push endpoint. Keys are stored normalized as
    /// `{"p256dh": ..., "auth": ...}`.
    pub async fn subscribe(
        &self,
        user_id: i64,
        endpoint: &str,
        keys_json: &str,
    ) -> Result<PushSubscription, NotificationServiceError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(NotificationServiceError::ValidationError(
                "Endpoint is required".to_string(),
            ));
        }
        let keys = parse_push_keys(keys_json).ok_or_else(|| {
            NotificationServiceError::ValidationError(
                "keysJson must contain p256dh and auth".to_string(),
            )
        })?;
        let normalized = serde_json::to_string(&keys).context("Failed to encode push keys")?;

        let subscription = self
            .subscriptions
            .upsert(user_id, endpoint, &normalized)
            .await?;
        tracing::debug!("User {} subscribed to push at {}", user_id, endpoint);
        Ok(subscription)
    }

    /// Remove a push endpoint; `false` when it was not registered
    pub async fn unsubscribe(
        &self,
        user_id: i64,
        endpoint: &str,
    ) -> Result<bool, NotificationServiceError> {
        Ok(self.subscriptions.delete(user_id, endpoint.trim()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxNotificationRepository, SqlxPushSubscriptionRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    fn push_config() -> PushConfig {
        PushConfig {
            vapid_public_key: Some("BPublicKey".to_string()),
            vapid_private_key: Some("private".to_string()),
            subject: None,
        }
    }

    async fn setup_test_service(push: PushConfig) -> (DynDatabasePool, NotificationService, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let mut ids = Vec::new();
        for email in ["a@example.com", "b@example.com"] {
            let id = sqlx::query(
                "INSERT INTO users (email, password_hash, full_name, role) VALUES (?, 'h', 'User', 'volunteer')",
            )
            .bind(email)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap()
            .last_insert_rowid();
            ids.push(id);
        }

        let service = NotificationService::new(
            SqlxNotificationRepository::boxed(pool.clone()),
            SqlxPushSubscriptionRepository::boxed(pool.clone()),
            &push,
        );
        (pool, service, ids[0], ids[1])
    }

    #[test]
    fn test_parse_push_keys_shapes() {
        let expected = Some(PushKeys {
            p256dh: "p".to_string(),
            auth: "a".to_string(),
        });

        assert_eq!(parse_push_keys(r#"{"p256dh":"p","auth":"a"}"#), expected);
        assert_eq!(parse_push_keys(r#"{"keys":{"p256dh":"p","auth":"a"}}"#), expected);
        assert_eq!(
            parse_push_keys(r#"{"subscription":{"endpoint":"x","keys":{"p256dh":"p","auth":"a"}}}"#),
            expected
        );
    }

    #[test]
    fn test_parse_push_keys_rejects_incomplete() {
        assert_eq!(parse_push_keys(r#"{"p256dh":"p"}"#), None);
        assert_eq!(parse_push_keys(r#"{"keys":{"auth":"a"}}"#), None);
        assert_eq!(parse_push_keys("not json"), None);
        assert_eq!(parse_push_keys(r#"{"p256dh":1,"auth":2}"#), None);
    }

    #[tokio::test]
    async fn test_notify_and_list() {
        let (_pool, service, alice, _) = setup_test_service(push_config()).await;

        service
            .notify(
                NewNotification::new(alice, "registration_approved", "Approved")
                    .message("You are in")
                    .link("/events/1"),
            )
            .await
            .unwrap();
        service
            .notify(NewNotification::new(alice, "admin", "Hello"))
            .await
            .unwrap();

        let page = service.list(alice, false, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].title, "Hello");
        assert_eq!(service.unread_count(alice).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_notify_requires_title() {
        let (_pool, service, alice, _) = setup_test_service(push_config()).await;

        let result = service.notify(NewNotification::new(alice, "admin", "  ")).await;
        assert!(matches!(result, Err(NotificationServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_mark_read_checks_owner() {
        let (_pool, service, alice, bob) = setup_test_service(push_config()).await;
        let n = service
            .notify(NewNotification::new(alice, "admin", "Hi"))
            .await
            .unwrap();

        assert!(matches!(
            service.mark_read(bob, n.id).await,
            Err(NotificationServiceError::Forbidden)
        ));
        assert!(matches!(
            service.mark_read(alice, 9999).await,
            Err(NotificationServiceError::NotFound)
        ));

        service.mark_read(alice, n.id).await.unwrap();
        assert_eq!(service.unread_count(alice).await.unwrap(), 0);

        let unread = service.list(alice, true, &ListParams::default()).await.unwrap();
        assert_eq!(unread.total, 0);
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let (_pool, service, alice, bob) = setup_test_service(push_config()).await;
        for _ in 0..3 {
            service.notify(NewNotification::new(alice, "admin", "Hi")).await.unwrap();
        }
        service.notify(NewNotification::new(bob, "admin", "Hi")).await.unwrap();

        assert_eq!(service.mark_all_read(alice).await.unwrap(), 3);
        assert_eq!(service.unread_count(alice).await.unwrap(), 0);
        assert_eq!(service.unread_count(bob).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_normalizes_keys() {
        let (_pool, service, alice, _) = setup_test_service(push_config()).await;

        let sub = service
            .subscribe(
                alice,
                "https://push.example.com/abc",
                r#"{"subscription":{"keys":{"p256dh":"p","auth":"a"}}}"#,
            )
            .await
            .unwrap();
        assert_eq!(sub.keys_json, r#"{"p256dh":"p","auth":"a"}"#);

        // Same endpoint again updates in place
        service
            .subscribe(alice, "https://push.example.com/abc", r#"{"p256dh":"p2","auth":"a2"}"#)
            .await
            .unwrap();

        assert!(service.unsubscribe(alice, "https://push.example.com/abc").await.unwrap());
        assert!(!service.unsubscribe(alice, "https://push.example.com/abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_subscribe_rejects_missing_keys() {
        let (_pool, service, alice, _) = setup_test_service(push_config()).await;

        let result = service
            .subscribe(alice, "https://push.example.com/abc", r#"{"p256dh":"p"}"#)
            .await;
        assert!(matches!(result, Err(NotificationServiceError::ValidationError(_))));

        let result = service.subscribe(alice, " ", r#"{"p256dh":"p","auth":"a"}"#).await;
        assert!(matches!(result, Err(NotificationServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_vapid_public_key() {
        let (_pool, configured, _, _) = setup_test_service(push_config()).await;
        assert_eq!(configured.vapid_public_key().unwrap(), "BPublicKey");

        let (_pool, unconfigured, _, _) = setup_test_service(PushConfig::default()).await;
        assert!(matches!(
            unconfigured.vapid_public_key(),
            Err(NotificationServiceError::PushNotConfigured)
        ));
    }

    #[test]
    fn test_dispatcher_prepares_payload_only_with_keys() {
        let subscription = PushSubscription {
            id: 1,
            user_id: 1,
            endpoint: "https://push.example.com/abc".to_string(),
            keys_json: r#"{"p256dh":"p","auth":"a"}"#.to_string(),
            created_at: chrono::Utc::now(),
        };
        let notification = Notification {
            id: 1,
            user_id: 1,
            kind: "admin".to_string(),
            title: "Hi".to_string(),
            message: None,
            payload: None,
            link: None,
            is_read: false,
            created_at: chrono::Utc::now(),
        };

        assert!(PushDispatcher::new(&PushConfig::default())
            .prepare(&subscription, &notification)
            .is_none());

        let payload = PushDispatcher::new(&push_config())
            .prepare(&subscription, &notification)
            .unwrap();
        let payload: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(payload["title"], "Hi");
        assert_eq!(payload["message"], "");
        assert_eq!(payload["url"], "");
        assert_eq!(payload["payload"], "");

        let keyless = PushSubscription {
            keys_json: r#"{"endpoint":"x"}"#.to_string(),
            ..subscription
        };
        assert!(PushDispatcher::new(&push_config())
            .prepare(&keyless, &notification)
            .is_none());
    }
}
