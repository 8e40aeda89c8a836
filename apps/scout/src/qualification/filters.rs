//! Eligibility Filter Chain.
//!
//! Stages run cheapest first and stop at the first failure:
//! login recency → tenure recency → employer match → duplicate → AI.
//! Nothing here returns an error; every failure becomes a `Verdict`.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::models::candidate::{
    CONTACT_MANUAL, CONTACT_NOT_VIEWED, COOPERATION_DEFAULT, LOGIN_UNKNOWN,
};
use crate::models::{CandidateRecord, RunConfiguration};
use crate::qualification::gateway::{Classification, DecisionGateway};
use crate::qualification::login::{find_login_date, format_login_date};
use crate::qualification::names::{display_name, parse_gender};
use crate::qualification::signature::CandidateSignature;
use crate::qualification::tenure::{end_token, is_tenure_ok, normalize};
use crate::site::ProfileView;
use crate::state::RunState;

/// Consecutive non-accepts after which a search pass is abandoned.
pub const EARLY_STOP_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoginRecency,
    TenureRecency,
    Extraction,
    EmployerMatch,
    Duplicate,
    AiClassification,
    Persistence,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::LoginRecency => "login-recency",
            Stage::TenureRecency => "tenure-recency",
            Stage::Extraction => "extraction",
            Stage::EmployerMatch => "employer-match",
            Stage::Duplicate => "duplicate",
            Stage::AiClassification => "ai-classification",
            Stage::Persistence => "persistence",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub stage: Stage,
    /// Best identifier available at the failing stage (name, else URL).
    pub candidate: String,
    pub reason: String,
}

impl Rejection {
    pub fn new(stage: Stage, candidate: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage,
            candidate: candidate.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.candidate, self.reason)
    }
}

/// Everything needed to persist an accepted candidate.
#[derive(Debug, Clone)]
pub struct Acceptance {
    pub record: CandidateRecord,
    pub signature: CandidateSignature,
    pub html: String,
}

#[derive(Debug, Clone)]
pub enum Verdict {
    Accept(Box<Acceptance>),
    Reject(Rejection),
    Inconclusive(Rejection),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Verdict::Accept(_) => None,
            Verdict::Reject(r) | Verdict::Inconclusive(r) => Some(r),
        }
    }

    /// Duplicates say nothing about result quality and are not counted.
    pub fn counts_toward_budget(&self) -> bool {
        match self.rejection() {
            Some(r) => r.stage != Stage::Duplicate,
            None => false,
        }
    }

    pub fn log(&self) {
        match self {
            Verdict::Accept(a) => info!(
                "Accepted {} ({} @ {}, {})",
                a.record.display_name, a.record.title, a.record.actual_employer, a.record.tenure
            ),
            Verdict::Reject(r) => warn!("Rejected {r}"),
            Verdict::Inconclusive(r) => warn!("Inconclusive {r}"),
        }
    }
}

/// Per-pass consecutive-failure counter.
#[derive(Debug, Clone)]
pub struct EarlyStop {
    consecutive: u32,
    threshold: u32,
}

impl Default for EarlyStop {
    fn default() -> Self {
        Self::new(EARLY_STOP_THRESHOLD)
    }
}

impl EarlyStop {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive: 0,
            threshold,
        }
    }

    pub fn record(&mut self, verdict: &Verdict) {
        if verdict.is_accept() {
            self.consecutive = 0;
        } else if verdict.counts_toward_budget() {
            self.consecutive += 1;
        }
    }

    #[cfg(test)]
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn exhausted(&self) -> bool {
        self.consecutive >= self.threshold
    }
}

pub struct FilterChain {
    gateway: Arc<dyn DecisionGateway>,
}

impl FilterChain {
    pub fn new(gateway: Arc<dyn DecisionGateway>) -> Self {
        Self { gateway }
    }

    /// Runs every stage against one opened profile. `employer` is the
    /// searched employer; `briefing` already has it substituted.
    pub async fn evaluate<P>(
        &self,
        profile: &P,
        config: &RunConfiguration,
        employer: &str,
        briefing: &str,
        state: &RunState,
    ) -> Verdict
    where
        P: ProfileView + ?Sized,
    {
        let url = profile.url().await;

        // 1. Login recency
        let last_login = login_date(profile).await;
        if let Some(min) = config.min_last_login {
            match last_login {
                None => {
                    return Verdict::Inconclusive(Rejection::new(
                        Stage::LoginRecency,
                        &url,
                        format!("last-login date not found, expected on or after {min}"),
                    ))
                }
                Some(actual) if actual < min => {
                    return Verdict::Reject(Rejection::new(
                        Stage::LoginRecency,
                        &url,
                        format!("last login {actual} is before {min}"),
                    ))
                }
                Some(_) => {}
            }
        }

        // 2. Tenure recency
        let tenure = match profile.tenure_text().await {
            Ok(raw) => normalize(&raw),
            Err(e) => {
                return Verdict::Inconclusive(Rejection::new(
                    Stage::TenureRecency,
                    &url,
                    format!("tenure unreadable: {e}"),
                ))
            }
        };
        if !is_tenure_ok(&tenure, &config.min_tenure_end) {
            return Verdict::Reject(Rejection::new(
                Stage::TenureRecency,
                &url,
                format!(
                    "tenure '{tenure}' ends {}, expected not before {}",
                    end_token(&tenure),
                    config.min_tenure_end
                ),
            ));
        }

        // 3. Identity fields and employer match
        let raw_name = match profile.name().await {
            Ok(name) => name,
            Err(e) => return extraction_failure(&url, "name", e),
        };
        let gender = profile.info_text().await.ok().and_then(|t| parse_gender(&t));
        let name = display_name(&raw_name, gender, config.initials_only);
        let title = match profile.title().await {
            Ok(title) => title.trim().to_string(),
            Err(e) => return extraction_failure(&name, "title", e),
        };
        let actual_employer = match profile.employer().await {
            Ok(company) => company.trim().to_string(),
            Err(e) => return extraction_failure(&name, "employer", e),
        };
        if !actual_employer.to_lowercase().contains(&employer.to_lowercase()) {
            return Verdict::Reject(Rejection::new(
                Stage::EmployerMatch,
                &name,
                format!("employer '{actual_employer}' does not contain '{employer}'"),
            ));
        }

        // 4. Duplicate
        let signature = CandidateSignature::new(&name, &title, &tenure);
        if state.is_duplicate(&signature) {
            return Verdict::Reject(Rejection::new(
                Stage::Duplicate,
                &name,
                format!("already seen as {title} ({tenure})"),
            ));
        }

        // 5. AI classification
        let resume = match profile.resume_text().await {
            Ok(text) => text,
            Err(e) => return extraction_failure(&name, "resume text", e),
        };
        match self.gateway.classify(&resume, briefing).await {
            Classification::Yes => {}
            Classification::No => {
                return Verdict::Reject(Rejection::new(
                    Stage::AiClassification,
                    &name,
                    "briefing not matched",
                ))
            }
            Classification::Unknown => {
                return Verdict::Inconclusive(Rejection::new(
                    Stage::AiClassification,
                    &name,
                    "gateway unavailable after retries",
                ))
            }
        }

        let html = match profile.html().await {
            Ok(html) => html,
            Err(e) => return extraction_failure(&name, "page html", e),
        };
        let summary = self.gateway.summarize(&resume, employer).await;
        debug!("Summary for {name}: {} chars", summary.len());

        let record = CandidateRecord {
            category: config.category.clone(),
            employer_searched: employer.to_string(),
            display_name: name,
            title,
            actual_employer,
            tenure,
            contact: if config.view_phone {
                CONTACT_MANUAL
            } else {
                CONTACT_NOT_VIEWED
            }
            .to_string(),
            profile_url: url,
            summary,
            cooperation: COOPERATION_DEFAULT.to_string(),
            last_login: last_login
                .map(format_login_date)
                .unwrap_or_else(|| LOGIN_UNKNOWN.to_string()),
        };

        Verdict::Accept(Box::new(Acceptance {
            record,
            signature,
            html,
        }))
    }
}

async fn login_date<P: ProfileView + ?Sized>(profile: &P) -> Option<NaiveDate> {
    let area = profile.login_area_text().await.ok();
    if let Some(date) = find_login_date(area.as_deref(), None) {
        return Some(date);
    }
    let header = profile.header_text().await.ok();
    find_login_date(None, header.as_deref())
}

fn extraction_failure(candidate: &str, field: &str, err: impl fmt::Display) -> Verdict {
    Verdict::Inconclusive(Rejection::new(
        Stage::Extraction,
        candidate,
        format!("{field} unreadable: {err}"),
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::browser::ExtractionError;
    use crate::qualification::signature::DedupIndex;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Profile with fixed field values; `None` fields time out.
    #[derive(Debug, Clone, Default)]
    pub struct FakeProfile {
        pub url: String,
        pub login_area: Option<String>,
        pub header: Option<String>,
        pub tenure: Option<String>,
        pub name: Option<String>,
        pub info: Option<String>,
        pub title: Option<String>,
        pub employer: Option<String>,
        pub resume: Option<String>,
    }

    impl FakeProfile {
        /// A profile that passes every stage against `employer`.
        pub fn qualified(name: &str, employer: &str, login: &str) -> Self {
            Self {
                url: format!("https://h.liepin.com/resume/{name}"),
                login_area: Some(format!("最近登录 {login}")),
                header: None,
                tenure: Some("（2020.01 - 至今，5年）".to_string()),
                name: Some(name.to_string()),
                info: Some("男 | 35岁 | 本科".to_string()),
                title: Some("Engineer".to_string()),
                employer: Some(employer.to_string()),
                resume: Some("Built payment systems at Acme".to_string()),
            }
        }
    }

    fn field(value: &Option<String>, selector: &str) -> Result<String, ExtractionError> {
        value.clone().ok_or(ExtractionError::Timeout {
            selector: selector.to_string(),
            timeout: Duration::from_secs(5),
        })
    }

    #[async_trait]
    impl ProfileView for FakeProfile {
        async fn url(&self) -> String {
            self.url.clone()
        }
        async fn login_area_text(&self) -> Result<String, ExtractionError> {
            field(&self.login_area, "login")
        }
        async fn header_text(&self) -> Result<String, ExtractionError> {
            field(&self.header, "header")
        }
        async fn tenure_text(&self) -> Result<String, ExtractionError> {
            field(&self.tenure, "tenure")
        }
        async fn name(&self) -> Result<String, ExtractionError> {
            field(&self.name, "name")
        }
        async fn info_text(&self) -> Result<String, ExtractionError> {
            field(&self.info, "info")
        }
        async fn title(&self) -> Result<String, ExtractionError> {
            field(&self.title, "title")
        }
        async fn employer(&self) -> Result<String, ExtractionError> {
            field(&self.employer, "employer")
        }
        async fn resume_text(&self) -> Result<String, ExtractionError> {
            field(&self.resume, "resume")
        }
        async fn html(&self) -> Result<String, ExtractionError> {
            Ok(format!("<html><body>{}</body></html>", self.resume.clone().unwrap_or_default()))
        }
        async fn capture_contact(&self, path: &Path) -> Result<(), ExtractionError> {
            std::fs::write(path, b"png").map_err(ExtractionError::browser)
        }
    }

    /// Answers YES when the resume mentions the keyword.
    pub struct KeywordGateway {
        pub keyword: String,
        pub classify_calls: AtomicU32,
    }

    impl KeywordGateway {
        pub fn new(keyword: &str) -> Arc<Self> {
            Arc::new(Self {
                keyword: keyword.to_string(),
                classify_calls: AtomicU32::new(0),
            })
        }

        pub fn calls(&self) -> u32 {
            self.classify_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DecisionGateway for KeywordGateway {
        async fn classify(&self, document: &str, _criteria: &str) -> Classification {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            if self.keyword == "__unavailable__" {
                Classification::Unknown
            } else if document.contains(&self.keyword) {
                Classification::Yes
            } else {
                Classification::No
            }
        }

        async fn summarize(&self, _document: &str, focus: &str) -> String {
            format!("{focus}的经历: summary")
        }
    }

    pub fn config() -> RunConfiguration {
        RunConfiguration {
            category: "上游".to_string(),
            employers: crate::models::run::parse_employers("Acme 1"),
            positions: vec!["Engineer".to_string()],
            briefing_template: "Worked at __COMPANY__".to_string(),
            view_phone: false,
            initials_only: false,
            min_tenure_end: "24/1".to_string(),
            min_last_login: None,
            output_filename: "run.csv".to_string(),
            default_stem: None,
            zip_label: "ZTZ".to_string(),
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn run(profile: &FakeProfile, config: &RunConfiguration, state: &RunState) -> (Verdict, u32) {
        let gateway = KeywordGateway::new("payment");
        let chain = FilterChain::new(gateway.clone());
        let verdict = chain
            .evaluate(profile, config, "Acme", "Worked at Acme", state)
            .await;
        (verdict, gateway.calls())
    }

    #[tokio::test]
    async fn test_accepts_and_builds_full_record() {
        let state = RunState::new(DedupIndex::new());
        let profile = FakeProfile::qualified("张**", "ACME Corp", "2025/10/01");

        let (verdict, calls) = run(&profile, &config(), &state).await;
        let Verdict::Accept(acceptance) = verdict else {
            panic!("expected accept, got {verdict:?}");
        };
        let record = &acceptance.record;
        assert_eq!(record.display_name, "张先生");
        assert_eq!(record.employer_searched, "Acme");
        assert_eq!(record.actual_employer, "ACME Corp");
        assert_eq!(record.tenure, "20/1-Present");
        assert_eq!(record.contact, CONTACT_NOT_VIEWED);
        assert_eq!(record.last_login, "2025/10/01");
        assert_eq!(record.cooperation, "否");
        assert_eq!(record.summary, "Acme的经历: summary");
        assert_eq!(acceptance.signature, CandidateSignature::new("张", "Engineer", "20/1-Present"));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_missing_login_with_threshold_is_inconclusive() {
        let state = RunState::new(DedupIndex::new());
        let mut config = config();
        config.min_last_login = Some(ymd(2025, 1, 1));
        let mut profile = FakeProfile::qualified("张三", "Acme", "2025/10/01");
        profile.login_area = None;

        let (verdict, calls) = run(&profile, &config, &state).await;
        assert!(matches!(&verdict, Verdict::Inconclusive(r) if r.stage == Stage::LoginRecency));
        assert!(verdict.counts_toward_budget());
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_login_found_in_header_when_area_has_no_date() {
        let state = RunState::new(DedupIndex::new());
        let mut config = config();
        config.min_last_login = Some(ymd(2025, 1, 1));
        let mut profile = FakeProfile::qualified("张三", "Acme", "2025/10/01");
        profile.login_area = Some("在线".to_string());
        profile.header = Some("最后登录 2024/06/30".to_string());

        let (verdict, _) = run(&profile, &config, &state).await;
        let rejection = verdict.rejection().unwrap();
        assert_eq!(rejection.stage, Stage::LoginRecency);
        assert!(matches!(verdict, Verdict::Reject(_)));
    }

    #[tokio::test]
    async fn test_missing_login_without_threshold_is_unknown() {
        let state = RunState::new(DedupIndex::new());
        let mut profile = FakeProfile::qualified("张三", "Acme", "");
        profile.login_area = None;
        let (verdict, _) = run(&profile, &config(), &state).await;
        let Verdict::Accept(acceptance) = verdict else {
            panic!("expected accept");
        };
        assert_eq!(acceptance.record.last_login, LOGIN_UNKNOWN);
    }

    #[tokio::test]
    async fn test_stale_tenure_rejected_before_ai() {
        let state = RunState::new(DedupIndex::new());
        let mut profile = FakeProfile::qualified("张三", "Acme", "2025/10/01");
        profile.tenure = Some("2019.01 - 2023.01".to_string());
        let (verdict, calls) = run(&profile, &config(), &state).await;
        assert_eq!(verdict.rejection().unwrap().stage, Stage::TenureRecency);
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_employer_mismatch_counts_but_duplicate_does_not() {
        let state = RunState::new(DedupIndex::new());
        let mut budget = EarlyStop::new(EARLY_STOP_THRESHOLD);

        let mismatch = FakeProfile::qualified("张三", "Globex", "2025/10/01");
        let (verdict, _) = run(&mismatch, &config(), &state).await;
        assert_eq!(verdict.rejection().unwrap().stage, Stage::EmployerMatch);
        budget.record(&verdict);
        assert_eq!(budget.consecutive(), 1);

        state.commit(
            CandidateRecord::default(),
            CandidateSignature::new("李四", "Engineer", "20/1-Present"),
        );
        let duplicate = FakeProfile::qualified("李四", "Acme", "2025/10/01");
        let (verdict, calls) = run(&duplicate, &config(), &state).await;
        assert_eq!(verdict.rejection().unwrap().stage, Stage::Duplicate);
        assert_eq!(calls, 0);
        budget.record(&verdict);
        assert_eq!(budget.consecutive(), 1);
    }

    #[tokio::test]
    async fn test_ai_no_and_unknown() {
        let state = RunState::new(DedupIndex::new());
        let mut profile = FakeProfile::qualified("张三", "Acme", "2025/10/01");
        profile.resume = Some("Sold insurance".to_string());
        let (verdict, calls) = run(&profile, &config(), &state).await;
        assert!(matches!(&verdict, Verdict::Reject(r) if r.stage == Stage::AiClassification));
        assert_eq!(calls, 1);

        let chain = FilterChain::new(KeywordGateway::new("__unavailable__"));
        let verdict = chain
            .evaluate(&profile, &config(), "Acme", "b", &state)
            .await;
        assert!(matches!(&verdict, Verdict::Inconclusive(r) if r.stage == Stage::AiClassification));
    }

    #[tokio::test]
    async fn test_initials_and_phone_flags() {
        let state = RunState::new(DedupIndex::new());
        let mut config = config();
        config.initials_only = true;
        config.view_phone = true;
        let mut profile = FakeProfile::qualified("王五", "Acme", "2025/10/01");
        profile.info = Some("女 | 30岁".to_string());

        let (verdict, _) = run(&profile, &config, &state).await;
        let Verdict::Accept(acceptance) = verdict else {
            panic!("expected accept");
        };
        assert_eq!(acceptance.record.display_name, "W女士");
        assert_eq!(acceptance.record.contact, CONTACT_MANUAL);
    }

    #[test]
    fn test_early_stop_resets_on_accept() {
        let mut budget = EarlyStop::new(2);
        let reject = Verdict::Reject(Rejection::new(Stage::EmployerMatch, "x", "y"));
        budget.record(&reject);
        budget.record(&Verdict::Accept(Box::new(Acceptance {
            record: CandidateRecord::default(),
            signature: CandidateSignature::new("a", "b", "c"),
            html: String::new(),
        })));
        assert_eq!(budget.consecutive(), 0);
        budget.record(&reject);
        budget.record(&reject);
        assert!(budget.exhausted());
    }
}
