//! `/graphql` operation dispatch
//!
//! The endpoint accepts the GraphQL request envelope
//! (`operationName` + `variables`) and routes by operation name; a full
//! GraphQL executor is deliberately out of scope. The raw envelope becomes
//! the request context's body, which is how mutations get correlated with
//! the request that caused them in the activity log.

use axum::{extract::State, Extension, Json};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::audit::{ActivityLogQuery, RequestContext};
use crate::features::auth::commands::{
    login::{self, LoginCommand, LoginError},
    refresh::{self, RefreshTokenCommand, RefreshTokenError},
    signup::{self, SignupCommand, SignupError},
};
use crate::features::users::commands::{
    create::{self, CreateUserCommand, CreateUserError},
    delete::{self, SoftDeleteUserCommand, SoftDeleteUserError},
    update::{self, UpdateUserCommand, UpdateUserError},
};
use crate::features::users::queries::{
    get::{self, GetUserQuery},
    list::{self, ListUsersQuery},
};

use super::response::{data_response, ApiError};
use super::AppState;
use crate::middleware::auth::CurrentUser;

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationRequest {
    #[serde(default)]
    operation_name: Option<String>,
    #[serde(default)]
    variables: serde_json::Map<String, JsonValue>,
}

pub async fn graphql(
    State(state): State<AppState>,
    Extension(CurrentUser(identity)): Extension<CurrentUser>,
    Json(body): Json<JsonValue>,
) -> Result<Json<JsonValue>, ApiError> {
    let envelope = body
        .as_object()
        .cloned()
        .ok_or_else(|| ApiError::bad_request("Request body must be a JSON object"))?;

    let request: OperationRequest = serde_json::from_value(JsonValue::Object(envelope.clone()))
        .map_err(|e| ApiError::bad_request(format!("Malformed request envelope: {e}")))?;
    let operation = request
        .operation_name
        .ok_or_else(|| ApiError::bad_request("operationName is required"))?;

    let ctx = RequestContext::new(envelope, identity.clone());
    let features = &state.features;
    let variables = &request.variables;

    let result = match operation.as_str() {
        "signup" => {
            let command = SignupCommand {
                input: variable(variables, "signupInput")?,
            };
            to_json(signup::handle(features, &ctx, command).await?)?
        },
        "login" => {
            let command = LoginCommand {
                input: variable(variables, "loginInput")?,
            };
            to_json(login::handle(features, command).await?)?
        },
        "refreshToken" => {
            let command = RefreshTokenCommand {
                input: variable(variables, "refreshTokenInput")?,
            };
            to_json(refresh::handle(features, command).await?)?
        },
        "createUser" => {
            require_auth(&identity)?;
            let command = CreateUserCommand {
                input: variable(variables, "input")?,
            };
            to_json(create::handle(features, &ctx, command).await?)?
        },
        "updateUser" => {
            require_auth(&identity)?;
            let command = UpdateUserCommand {
                input: variable(variables, "input")?,
            };
            to_json(update::handle(features, &ctx, command).await?)?
        },
        "softDeleteUser" => {
            require_auth(&identity)?;
            let command: SoftDeleteUserCommand = variable(variables, "input")?;
            to_json(delete::handle(features, &ctx, command).await?)?
        },
        "getUser" => {
            require_auth(&identity)?;
            let query = GetUserQuery {
                input: variable(variables, "input")?,
            };
            to_json(get::handle(features, query).await.map_err(internal)?)?
        },
        "getUsers" => {
            require_auth(&identity)?;
            let query = ListUsersQuery {
                input: variable_or_default(variables, "input")?,
            };
            to_json(list::handle(features, query).await.map_err(internal)?)?
        },
        "activityLogs" => {
            require_auth(&identity)?;
            let query: ActivityLogQuery = variable_or_default(variables, "input")?;
            to_json(features.audit.list(query).await.map_err(internal)?)?
        },
        _ => return Err(ApiError::bad_request(format!("Unknown operation: {operation}"))),
    };

    Ok(data_response(&operation, result))
}

fn require_auth(
    identity: &Option<crate::audit::UserIdentity>,
) -> Result<(), ApiError> {
    if identity.is_none() {
        return Err(ApiError::unauthorized("Authentication required"));
    }
    Ok(())
}

fn variable<T: DeserializeOwned>(
    variables: &serde_json::Map<String, JsonValue>,
    key: &str,
) -> Result<T, ApiError> {
    let value = variables
        .get(key)
        .ok_or_else(|| ApiError::bad_request(format!("Missing variable: {key}")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| ApiError::bad_request(format!("Invalid variable {key}: {e}")))
}

fn variable_or_default<T: DeserializeOwned + Default>(
    variables: &serde_json::Map<String, JsonValue>,
    key: &str,
) -> Result<T, ApiError> {
    match variables.get(key) {
        None | Some(JsonValue::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| ApiError::bad_request(format!("Invalid variable {key}: {e}"))),
    }
}

fn to_json<T: serde::Serialize>(value: T) -> Result<JsonValue, ApiError> {
    serde_json::to_value(value).map_err(internal)
}

fn internal(error: impl std::fmt::Display) -> ApiError {
    ApiError::internal(error.to_string())
}

// ----------------------------------------------------------------------
// Error mappings: feature errors to HTTP-facing errors
// ----------------------------------------------------------------------

impl From<CreateUserError> for ApiError {
    fn from(error: CreateUserError) -> Self {
        match error {
            CreateUserError::Duplicate(field) => {
                ApiError::Conflict(format!("A user with this {field} already exists"))
            },
            CreateUserError::Store(e) => internal(e),
            CreateUserError::Serialization(e) => internal(e),
            CreateUserError::Password(e) => internal(e),
            validation => ApiError::BadRequest(validation.to_string()),
        }
    }
}

impl From<UpdateUserError> for ApiError {
    fn from(error: UpdateUserError) -> Self {
        match error {
            UpdateUserError::NotFound(id) => ApiError::NotFound(format!("User '{id}' not found")),
            UpdateUserError::Store(e) => internal(e),
            UpdateUserError::Serialization(e) => internal(e),
            UpdateUserError::Password(e) => internal(e),
            validation => ApiError::BadRequest(validation.to_string()),
        }
    }
}

impl From<SoftDeleteUserError> for ApiError {
    fn from(error: SoftDeleteUserError) -> Self {
        match error {
            SoftDeleteUserError::NotFound(id) => {
                ApiError::NotFound(format!("User '{id}' not found"))
            },
            missing_id @ SoftDeleteUserError::IdRequired => {
                ApiError::BadRequest(missing_id.to_string())
            },
            SoftDeleteUserError::Store(e) => internal(e),
            SoftDeleteUserError::Serialization(e) => internal(e),
        }
    }
}

impl From<SignupError> for ApiError {
    fn from(error: SignupError) -> Self {
        match error {
            SignupError::User(e) => e.into(),
            SignupError::Token(e) => internal(e),
        }
    }
}

impl From<LoginError> for ApiError {
    fn from(error: LoginError) -> Self {
        match error {
            denied @ LoginError::InvalidCredentials => ApiError::Unauthorized(denied.to_string()),
            LoginError::Store(e) => internal(e),
            LoginError::Serialization(e) => internal(e),
            LoginError::Token(e) => internal(e),
        }
    }
}

impl From<RefreshTokenError> for ApiError {
    fn from(error: RefreshTokenError) -> Self {
        match error {
            denied @ RefreshTokenError::InvalidToken => ApiError::Unauthorized(denied.to_string()),
            RefreshTokenError::Store(e) => internal(e),
            RefreshTokenError::Serialization(e) => internal(e),
            RefreshTokenError::Token(e) => internal(e),
        }
    }
}
