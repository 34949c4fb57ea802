use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::services::{AccountProvider, NotificationBus};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: AppConfig,
    pub accounts: Arc<dyn AccountProvider>,
    pub notifications: NotificationBus,
}
