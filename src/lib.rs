//! `fedjoin` trains and evaluates financial-crime classifiers over private data partitions
//! without centralizing them.
//!
//! A central client holds payment transactions and any number of partition clients hold the
//! account flags of the banks they represent. A [`Coordinator`](coordinator::Coordinator)
//! drives a fixed sequence of rounds: 2 to train, 3 to predict. Clients only exchange the
//! join keys, bank memberships and scores needed to combine a transaction score with the
//! score of its beneficiary account.

pub mod centralized;
pub mod client;
pub mod common;
pub mod coordinator;
pub mod data;
pub mod federation;
pub mod message;
pub mod model;
pub mod payload;
pub mod predictions;
pub mod settings;
