// Backend endpoint table. Paths and trailing slashes are fixed by the
// backend router.

use finmodel_core::resources::PeriodType;

const REGISTER: &str = "/register/";
const LOGIN: &str = "/login/";
const REFRESH_TOKEN: &str = "/token/refresh/";
const LOGOUT: &str = "/logout/";
const PROFILE: &str = "/profile/";
const PROFILE_UPDATE: &str = "/profile/update";
const FINANCE_MODELS: &str = "/finance-model/";
const PERIODS: &str = "/period/";
const SCENARIOS: &str = "/scenario/";
const LINE_ITEMS: &str = "/line-item/";
const LINE_ITEM_UPLOAD: &str = "/line-item/upload/";

/// Absolute URLs for every backend resource, rooted at a base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    /// `base_url` may or may not end with `/`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub fn register(&self) -> String {
        self.url(REGISTER)
    }

    pub fn login(&self) -> String {
        self.url(LOGIN)
    }

    pub fn refresh_token(&self) -> String {
        self.url(REFRESH_TOKEN)
    }

    pub fn logout(&self) -> String {
        self.url(LOGOUT)
    }

    pub fn profile(&self) -> String {
        self.url(PROFILE)
    }

    pub fn profile_update(&self) -> String {
        self.url(PROFILE_UPDATE)
    }

    pub fn finance_models(&self) -> String {
        self.url(FINANCE_MODELS)
    }

    pub fn finance_models_page(&self, page: u32) -> String {
        format!("{}?page={page}", self.finance_models())
    }

    pub fn finance_model(&self, id: i64) -> String {
        format!("{}{id}/", self.finance_models())
    }

    pub fn periods(&self) -> String {
        self.url(PERIODS)
    }

    /// Period list with optional page and `period_type` filters.
    pub fn periods_query(&self, page: Option<u32>, period_type: Option<PeriodType>) -> String {
        let mut params = Vec::new();
        if let Some(page) = page {
            params.push(format!("page={page}"));
        }
        if let Some(period_type) = period_type {
            params.push(format!("period_type={}", period_type.code()));
        }
        with_query(self.periods(), &params)
    }

    pub fn period(&self, id: i64) -> String {
        format!("{}{id}/", self.periods())
    }

    pub fn scenarios(&self) -> String {
        self.url(SCENARIOS)
    }

    /// `/scenario/?model_id={id}`, with `&page={n}` when a page is given.
    pub fn scenarios_for_model(&self, model_id: i64, page: Option<u32>) -> String {
        let mut params = vec![format!("model_id={model_id}")];
        if let Some(page) = page {
            params.push(format!("page={page}"));
        }
        with_query(self.scenarios(), &params)
    }

    pub fn scenario(&self, id: i64) -> String {
        format!("{}{id}/", self.scenarios())
    }

    pub fn line_items(&self) -> String {
        self.url(LINE_ITEMS)
    }

    pub fn line_items_page(&self, model_id: i64, page: u32) -> String {
        format!("{}?page={page}&model_id={model_id}", self.line_items())
    }

    pub fn line_item_upload(&self) -> String {
        self.url(LINE_ITEM_UPLOAD)
    }
}

fn with_query(url: String, params: &[String]) -> String {
    if params.is_empty() {
        url
    } else {
        format!("{url}?{}", params.join("&"))
    }
}
