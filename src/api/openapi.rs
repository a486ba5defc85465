//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use super::dto::{ChannelDto, ChannelListResponse, IngestChangeRequest, IngestChangeResponse};
use super::handlers::{changes, channels, system};
use crate::domain::{ChangeEvent, ChannelState};
use crate::error::{ErrorBody, ErrorResponse};
use crate::service::ChannelRequest;
use crate::sync::WalletType;

/// Generated OpenAPI specification.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "travel-realtime",
        description = "Realtime row-change relay for bookings, trips, wallets, and availability."
    ),
    paths(
        system::health_handler,
        system::adapters_handler,
        channels::list_channels,
        channels::get_channel,
        channels::close_channel,
        changes::ingest_change,
    ),
    components(schemas(
        system::HealthResponse,
        system::AdapterInfo,
        ChannelDto,
        ChannelListResponse,
        IngestChangeRequest,
        IngestChangeResponse,
        ChannelRequest,
        ChangeEvent,
        ChannelState,
        WalletType,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "System", description = "Health and catalog"),
        (name = "Channels", description = "Pooled channel introspection"),
        (name = "Changes", description = "Row-change ingestion"),
    )
)]
pub struct ApiDoc;
