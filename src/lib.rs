#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub use crate::{
    classifier::{HEADER_LEN, Protocol, classify},
    config::{ApplicationConfig, CibSource},
    entrypoint::entrypoint,
    lookahead::LookaheadStream,
    split_listener::{
        AcceptError, ConnectionInfo, DEFAULT_CLASSIFY_TIMEOUT, SplitAcceptor, SplitListener,
        SplitStream,
    },
};

pub mod api;
pub mod auth;
mod certificates;
pub mod cib;
mod classifier;
mod config;
mod droppable_handle;
mod entrypoint;
mod error;
mod lookahead;
pub mod provider;
pub mod redirect;
mod split_listener;
mod tls;
