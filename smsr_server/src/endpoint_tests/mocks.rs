use chrono::{DateTime, Utc};
use mockall::mock;
use smsr_engine::{
    db_types::{PurchasedResource, ResourceStatus, Transaction, UnattributedPayment, Wallet},
    traits::{AccountApiError, AccountManagement},
};

mock! {
    pub AccountManager {}
    impl AccountManagement for AccountManager {
        async fn fetch_wallet(&self, owner_id: &str) -> Result<Option<Wallet>, AccountApiError>;
        async fn fetch_wallets_by_email(&self, email: &str) -> Result<Vec<Wallet>, AccountApiError>;
        async fn fetch_transaction(&self, id: i64) -> Result<Option<Transaction>, AccountApiError>;
        async fn fetch_transaction_by_reference(&self, source: &str, reference: &str) -> Result<Option<Transaction>, AccountApiError>;
        async fn fetch_transactions_for_owner(&self, owner_id: &str, limit: i64, offset: i64) -> Result<Vec<Transaction>, AccountApiError>;
        async fn fetch_pending_deposits(&self, created_before: DateTime<Utc>, limit: i64) -> Result<Vec<Transaction>, AccountApiError>;
        async fn fetch_stale_reservations(&self, created_before: DateTime<Utc>) -> Result<Vec<Transaction>, AccountApiError>;
        async fn fetch_resource(&self, id: i64) -> Result<Option<PurchasedResource>, AccountApiError>;
        async fn fetch_resources_for_owner(&self, owner_id: &str, limit: i64, offset: i64) -> Result<Vec<PurchasedResource>, AccountApiError>;
        async fn fetch_resources_to_poll(&self, limit: i64) -> Result<Vec<PurchasedResource>, AccountApiError>;
        async fn update_resource_status(&self, id: i64, status: ResourceStatus, messages: Option<String>) -> Result<Option<PurchasedResource>, AccountApiError>;
        async fn fetch_unattributed_payment_by_id(&self, id: i64) -> Result<Option<UnattributedPayment>, AccountApiError>;
        async fn fetch_unattributed_payment(&self, source: &str, reference: &str) -> Result<Option<UnattributedPayment>, AccountApiError>;
        async fn fetch_unattributed_payments(&self, include_resolved: bool) -> Result<Vec<UnattributedPayment>, AccountApiError>;
    }
}
