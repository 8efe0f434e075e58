pub mod catalog;
pub mod notify;
pub mod review;
pub mod voice;

pub use catalog::{load_catalog, Catalog, CatalogEntry, CatalogError};
pub use notify::{
    compose, AddressBook, Contact, NotifyRejection, RecipientPolicy, ShoppingListMessage,
};
pub use review::{
    transition, AdvancePolicy, Event, Outcome, ReviewError, ReviewSession, ReviewView, Selection,
    TransitionResult,
};
pub use voice::VoiceIntents;
