// Typed repositories over `ApiClient`.
//
// Each repository validates drafts locally, forwards to the matching client
// operation and decodes the JSON body into the resource type.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use finmodel_core::protocol::{Page, Profile, RegisterRequest};
use finmodel_core::resources::{
    FinanceModel, FinanceModelDraft, LineItem, Period, PeriodDraft, PeriodType, Scenario,
    ScenarioDraft,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::line_items::NewLineItem;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Field name to message, ordered by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

/// Local checks run before a draft is sent.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationErrors>;
}

fn require(errors: &mut ValidationErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "This field is required.");
    }
}

/// `local@domain.tld` with no whitespace.
fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, _)| !host.is_empty())
        && !domain.ends_with('.')
}

impl Validate for FinanceModelDraft {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        require(&mut errors, "name", &self.name);
        require(&mut errors, "version", &self.version);
        errors.into_result()
    }
}

impl Validate for PeriodDraft {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        require(&mut errors, "label", &self.label);
        if self.end_date < self.start_date {
            errors.add("end_date", "End date must not be before the start date.");
        }
        errors.into_result()
    }
}

impl Validate for ScenarioDraft {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        require(&mut errors, "name", &self.name);
        if self.model_id <= 0 {
            errors.add("model_id", "A finance model must be selected.");
        }
        errors.into_result()
    }
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        require(&mut errors, "email", &self.email);
        if !self.email.trim().is_empty() && !looks_like_email(self.email.trim()) {
            errors.add("email", "Enter a valid email address.");
        }
        require(&mut errors, "first_name", &self.first_name);
        if self.password.is_empty() {
            errors.add("password", "This field is required.");
        }
        errors.into_result()
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("invalid input: {0}")]
    Validation(ValidationErrors),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RepositoryError {
    /// Text to show the user.
    pub fn user_message(&self) -> String {
        match self {
            RepositoryError::Validation(errors) => errors.to_string(),
            RepositoryError::Api(err) => err.user_message(),
            RepositoryError::Decode(_) => "Unexpected response from the server".to_string(),
        }
    }
}

/// CRUD over one backend resource.
#[async_trait]
pub trait Repository<T>: Send + Sync {
    type Draft: Validate + Serialize + Send + Sync;

    async fn list(&self, page: u32) -> Result<Page<T>, RepositoryError>;
    async fn get(&self, id: i64) -> Result<T, RepositoryError>;
    async fn create(&self, draft: &Self::Draft) -> Result<T, RepositoryError>;
    async fn update(&self, id: i64, draft: &Self::Draft) -> Result<T, RepositoryError>;
    async fn delete(&self, id: i64) -> Result<(), RepositoryError>;
}

fn decode<T: DeserializeOwned>(data: Value) -> Result<T, RepositoryError> {
    Ok(serde_json::from_value(data)?)
}

fn validated<D: Validate>(draft: &D) -> Result<(), RepositoryError> {
    draft.validate().map_err(RepositoryError::Validation)
}

// ---------------------------------------------------------------------------
// Finance models
// ---------------------------------------------------------------------------

pub struct FinanceModelRepository {
    client: Arc<ApiClient>,
}

impl FinanceModelRepository {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Repository<FinanceModel> for FinanceModelRepository {
    type Draft = FinanceModelDraft;

    async fn list(&self, page: u32) -> Result<Page<FinanceModel>, RepositoryError> {
        decode(self.client.get_finance_models(page).await?)
    }

    async fn get(&self, id: i64) -> Result<FinanceModel, RepositoryError> {
        decode(self.client.get_finance_model(id).await?)
    }

    async fn create(&self, draft: &FinanceModelDraft) -> Result<FinanceModel, RepositoryError> {
        validated(draft)?;
        decode(self.client.create_finance_model(draft).await?)
    }

    async fn update(
        &self,
        id: i64,
        draft: &FinanceModelDraft,
    ) -> Result<FinanceModel, RepositoryError> {
        validated(draft)?;
        decode(self.client.update_finance_model(id, draft).await?)
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        self.client.delete_finance_model(id).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Periods
// ---------------------------------------------------------------------------

pub struct PeriodRepository {
    client: Arc<ApiClient>,
    period_type: Option<PeriodType>,
}

impl PeriodRepository {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            period_type: None,
        }
    }

    /// Restrict `list` to one period type.
    pub fn of_type(mut self, period_type: PeriodType) -> Self {
        self.period_type = Some(period_type);
        self
    }
}

#[async_trait]
impl Repository<Period> for PeriodRepository {
    type Draft = PeriodDraft;

    async fn list(&self, page: u32) -> Result<Page<Period>, RepositoryError> {
        decode(
            self.client
                .get_periods_filtered(Some(page), self.period_type)
                .await?,
        )
    }

    async fn get(&self, id: i64) -> Result<Period, RepositoryError> {
        decode(self.client.get_period(id).await?)
    }

    async fn create(&self, draft: &PeriodDraft) -> Result<Period, RepositoryError> {
        validated(draft)?;
        decode(self.client.create_period(draft).await?)
    }

    async fn update(&self, id: i64, draft: &PeriodDraft) -> Result<Period, RepositoryError> {
        validated(draft)?;
        decode(self.client.update_period(id, draft).await?)
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        self.client.delete_period(id).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// Scenarios of a single finance model.
pub struct ScenarioRepository {
    client: Arc<ApiClient>,
    model_id: i64,
}

impl ScenarioRepository {
    pub fn new(client: Arc<ApiClient>, model_id: i64) -> Self {
        Self { client, model_id }
    }

    pub fn model_id(&self) -> i64 {
        self.model_id
    }
}

#[async_trait]
impl Repository<Scenario> for ScenarioRepository {
    type Draft = ScenarioDraft;

    async fn list(&self, page: u32) -> Result<Page<Scenario>, RepositoryError> {
        decode(
            self.client
                .get_scenarios_page(self.model_id, Some(page))
                .await?,
        )
    }

    /// The backend has no single-scenario read; walk the model's list page
    /// by page until the id turns up or the pages run out.
    async fn get(&self, id: i64) -> Result<Scenario, RepositoryError> {
        let mut page_number = 1;
        loop {
            let data = if page_number == 1 {
                self.client.get_scenarios(self.model_id).await?
            } else {
                self.client
                    .get_scenarios_page(self.model_id, Some(page_number))
                    .await?
            };
            let page: Page<Scenario> = decode(data)?;
            let more = page.has_next();
            if let Some(found) = page.results.into_iter().find(|s| s.id == id) {
                return Ok(found);
            }
            if !more {
                return Err(ApiError::new("Scenario not found", 404, Value::Null).into());
            }
            page_number += 1;
        }
    }

    async fn create(&self, draft: &ScenarioDraft) -> Result<Scenario, RepositoryError> {
        validated(draft)?;
        decode(self.client.create_scenario(draft).await?)
    }

    async fn update(&self, id: i64, draft: &ScenarioDraft) -> Result<Scenario, RepositoryError> {
        validated(draft)?;
        decode(self.client.update_scenario(id, draft).await?)
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        self.client.delete_scenario(id).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Line items
// ---------------------------------------------------------------------------

/// Line items of a single finance model. The backend offers listing and
/// creation only, so this is not a full [`Repository`].
pub struct LineItemRepository {
    client: Arc<ApiClient>,
    model_id: i64,
}

impl LineItemRepository {
    pub fn new(client: Arc<ApiClient>, model_id: i64) -> Self {
        Self { client, model_id }
    }

    pub async fn list(&self, page: u32) -> Result<Page<LineItem>, RepositoryError> {
        decode(self.client.get_line_items(self.model_id, page).await?)
    }

    pub async fn create(&self, item: &NewLineItem) -> Result<LineItem, RepositoryError> {
        decode(self.client.create_line_item(item).await?)
    }
}

/// The signed-in user's profile.
pub async fn load_profile(client: &ApiClient) -> Result<Profile, RepositoryError> {
    decode(client.get_profile().await?)
}
