use crate::{
    entities::customer::{self, CustomerRole, Entity as CustomerEntity},
    errors::ServiceError,
    notifications::EmailSender,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use chrono::Utc;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, Set, SqlErr,
};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// How checkout identifies the buyer
#[derive(Debug, Clone, Default)]
pub struct CustomerLookup {
    pub customer_id: Option<Uuid>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

/// Generated password for a guest account, to be delivered out of band
#[derive(Clone)]
pub struct GuestCredentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for GuestCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedCustomer {
    pub customer: customer::Model,
    /// Present only when this resolution created a guest account
    pub credentials: Option<GuestCredentials>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Six-digit numeric one-time password
pub fn generate_one_time_password() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

async fn hash_password(password: String) -> Result<String, ServiceError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ServiceError::HashError(e.to_string()))
    })
    .await
    .map_err(|e| ServiceError::InternalError(format!("password hashing task failed: {e}")))?
}

/// Maps a checkout request to a customer record, creating a guest account when needed
#[derive(Clone)]
pub struct CustomerResolver {
    email_sender: Arc<dyn EmailSender>,
}

impl CustomerResolver {
    pub fn new(email_sender: Arc<dyn EmailSender>) -> Self {
        Self { email_sender }
    }

    #[instrument(skip(self, txn, lookup), fields(customer_id = ?lookup.customer_id))]
    pub async fn resolve(
        &self,
        txn: &DatabaseTransaction,
        lookup: &CustomerLookup,
    ) -> Result<ResolvedCustomer, ServiceError> {
        if let Some(customer_id) = lookup.customer_id {
            let found = CustomerEntity::find_by_id(customer_id)
                .one(txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Customer with ID {customer_id} not found."))
                })?;
            return Ok(ResolvedCustomer {
                customer: found,
                credentials: None,
            });
        }

        let email = lookup
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                ServiceError::ValidationError("Either customer_id or email is required.".into())
            })?;

        if let Some(found) = CustomerEntity::find()
            .filter(customer::Column::Email.eq(email.as_str()))
            .one(txn)
            .await?
        {
            return Ok(ResolvedCustomer {
                customer: found,
                credentials: None,
            });
        }

        let password = generate_one_time_password();
        let password_hash = hash_password(password.clone()).await?;
        let now = Utc::now();

        let created = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.clone()),
            password_hash: Set(password_hash),
            role: Set(CustomerRole::Customer),
            email_verified: Set(true),
            full_name: Set(lookup.full_name.clone()),
            phone: Set(lookup.phone.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(format!(
                "An account for {email} is being created by another request; retry the checkout."
            )),
            _ => ServiceError::DatabaseError(e),
        })?;

        info!(customer_id = %created.id, "Guest customer created at checkout");
        metrics::counter!("storefront.customers.guest_created", 1);

        Ok(ResolvedCustomer {
            customer: created,
            credentials: Some(GuestCredentials { email, password }),
        })
    }

    /// Best-effort credentials email; failures are logged and never propagated
    pub async fn deliver_credentials(&self, credentials: &GuestCredentials) {
        let delivery = self
            .email_sender
            .send_credentials(&credentials.email, &credentials.password)
            .await;
        if delivery.success {
            info!(email = %credentials.email, "Guest credentials delivered");
        } else {
            metrics::counter!("storefront.customers.credentials_undelivered", 1);
            warn!(
                email = %credentials.email,
                error = delivery.error.as_deref().unwrap_or("unknown"),
                "Guest credentials could not be delivered"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{EmailDelivery, MockEmailSender};
    use argon2::{PasswordHash, PasswordVerifier};

    #[test]
    fn one_time_passwords_are_six_digits() {
        for _ in 0..100 {
            let otp = generate_one_time_password();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = GuestCredentials {
            email: "guest@example.com".into(),
            password: "123456".into(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("guest@example.com"));
        assert!(!rendered.contains("123456"));
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM "), "jane.doe@example.com");
    }

    #[tokio::test]
    async fn hashed_password_verifies() {
        let hash = hash_password("482913".into()).await.unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default()
            .verify_password(b"482913", &parsed)
            .is_ok());
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let mut sender = MockEmailSender::new();
        sender
            .expect_send_credentials()
            .times(1)
            .returning(|_, _| EmailDelivery::failed("smtp down"));
        let resolver = CustomerResolver::new(Arc::new(sender));
        resolver
            .deliver_credentials(&GuestCredentials {
                email: "guest@example.com".into(),
                password: "123456".into(),
            })
            .await;
    }
}
