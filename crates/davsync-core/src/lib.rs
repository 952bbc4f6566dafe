//! davsync Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `LocalResource`, `LocalCollection`, `SyncState`,
//!   validated newtypes
//! - **Port definitions** - Traits for the external collaborators:
//!   `ILocalStore`, `IContactStore`, `IRemoteCollection`,
//!   `ICollectionRepository`
//! - **Configuration** - typed YAML-backed settings
//!
//! # Architecture
//!
//! The domain module holds pure business logic with no I/O. Ports define
//! trait interfaces whose implementations (local store, wire protocol
//! client, collection registry) live outside this repository. The
//! synchronization engine in `davsync-engine` orchestrates domain entities
//! through the port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
