pub mod access;
pub mod account;
pub mod blob;
pub mod notify;
pub mod review;
pub mod slot;

pub use account::{AccountProvider, AccountRef, DbAccountProvider, NewAccount};
pub use blob::{BlobMeta, BlobStore};
pub use notify::{LogNotifier, NotificationBus, Notifier};
