use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::features::auth::model::Role;
use crate::features::rate_limits::models::Tier;
use crate::features::rate_limits::{dtos as rate_limits_dtos, handlers as rate_limits_handlers};
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Role limits
        rate_limits_handlers::list_role_limits,
        rate_limits_handlers::get_role_limit,
        rate_limits_handlers::update_role_limit,
        // Endpoint limits
        rate_limits_handlers::list_endpoint_limits,
        rate_limits_handlers::create_endpoint_limit,
        rate_limits_handlers::get_endpoint_limit,
        rate_limits_handlers::update_endpoint_limit,
        rate_limits_handlers::delete_endpoint_limit,
        // User limits
        rate_limits_handlers::list_user_limits,
        rate_limits_handlers::get_user_limit,
        rate_limits_handlers::set_user_limit,
        rate_limits_handlers::remove_user_limit,
        // Usage, audit and retention
        rate_limits_handlers::get_user_usage,
        rate_limits_handlers::get_endpoint_usage,
        rate_limits_handlers::list_audit_logs,
        rate_limits_handlers::get_retention_status,
        rate_limits_handlers::trigger_retention_sweep,
        // Caller status
        rate_limits_handlers::get_rate_limit_status,
    ),
    components(
        schemas(
            Meta,
            Role,
            Tier,
            rate_limits_dtos::RoleLimitResponseDto,
            rate_limits_dtos::EndpointLimitResponseDto,
            rate_limits_dtos::UserLimitResponseDto,
            rate_limits_dtos::AuditEntryResponseDto,
            rate_limits_dtos::LimitValuesDto,
            rate_limits_dtos::CreateEndpointLimitDto,
            rate_limits_dtos::RateLimitExceededDto,
            rate_limits_dtos::RateLimitStatusDto,
            rate_limits_dtos::UsageResponseDto,
            rate_limits_dtos::RetentionSweepResponseDto,
            rate_limits_dtos::RetentionStatusDto,
            rate_limits_dtos::TriggerRetentionSweepDto,
            ApiResponse<Vec<rate_limits_dtos::RoleLimitResponseDto>>,
            ApiResponse<rate_limits_dtos::RoleLimitResponseDto>,
            ApiResponse<Vec<rate_limits_dtos::EndpointLimitResponseDto>>,
            ApiResponse<rate_limits_dtos::EndpointLimitResponseDto>,
            ApiResponse<Vec<rate_limits_dtos::UserLimitResponseDto>>,
            ApiResponse<rate_limits_dtos::UserLimitResponseDto>,
            ApiResponse<Vec<rate_limits_dtos::AuditEntryResponseDto>>,
            ApiResponse<rate_limits_dtos::UsageResponseDto>,
            ApiResponse<rate_limits_dtos::RetentionStatusDto>,
            ApiResponse<rate_limits_dtos::RetentionSweepResponseDto>,
            ApiResponse<rate_limits_dtos::RateLimitStatusDto>,
        )
    ),
    tags(
        (name = "rate-limits", description = "Tiered request throttling: limits, usage, audit and retention"),
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Tenant Throttle API",
        version = "0.1.0",
        description = "Administration API for the tiered request throttler",
    )
)]
pub struct ApiDoc;

/// Adds Bearer JWT security scheme to the OpenAPI document
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Overrides the document info with values from `SwaggerConfig`
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}
