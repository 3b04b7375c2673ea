//! Provider integrations
//!
//! This module contains the reusable sync plumbing shared by every provider:
//! - [`ProviderClient`], the retrying, credential-refreshing API client
//! - [`ProviderCapabilities`] and [`StageMapping`] descriptors
//! - The [`AtsProvider`] trait and the [`ProviderRegistry`]
//! - One thin adapter per provider

pub mod bamboohr;
pub mod capabilities;
pub mod client;
pub mod error;
pub mod greenhouse;
pub mod hubspot;
pub mod lever;
pub mod registry;
pub mod stage_mapping;
pub mod trait_;
pub mod types;
pub mod whatsapp;
pub mod workday;

pub use capabilities::{ProviderCapabilities, SyncMode};
pub use client::{
    AuthMaterial, AuthenticatedClient, CredentialProvider, ProviderClient, RecordingSleeper,
    RetryObserver, RetryPolicy, Sleeper, TokioSleeper,
};
pub use error::{ErrorKind, ProviderError};
pub use registry::{ProviderRegistry, RegistryError};
pub use stage_mapping::{StageMapping, is_hired};
pub use trait_::{AtsProvider, AuthStyle};
pub use types::{CandidatePhoto, CandidateRecord, InterviewRecord, RemoteRecord};

pub use bamboohr::BambooHrProvider;
pub use greenhouse::GreenhouseProvider;
pub use hubspot::HubSpotProvider;
pub use lever::LeverProvider;
pub use whatsapp::WhatsAppProvider;
pub use workday::WorkdayProvider;
