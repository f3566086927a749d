pub mod config;
pub mod hash;
pub mod identity;
pub mod ledger;
pub mod load;
pub mod normalize;
pub mod paths;
pub mod reconcile;
pub mod warn;
