//! End-to-end submission pipeline tests against a scripted driver.
//!
//! Each test scripts one marketplace page, runs a single keyword through
//! the full search/screen/decide/submit/verify pipeline, and asserts both
//! the settled result and the exact driver interactions that produced it.

mod common;

use common::{MockDriver, Reveal};

use rust_decimal_macros::dec;
use secrecy::SecretString;

use postor::config::{AgentConfig, AuthConfig, LabelsConfig, SelectorsConfig, TargetConfig};
use postor::engine::session::{Credentials, SubmissionEngine, SubmissionPhase};
use postor::engine::TaskError;
use postor::money::AmountLocale;
use postor::policy::BidPolicy;
use postor::screening::{ExclusionSet, Screening};
use postor::types::{AttemptResult, AttemptStatus, KeywordEntry};

const SEARCH: &str = "input[placeholder='Buscar']";
const CARD: &str = ".card-licitacion";
const BUDGET: &str = ".presupuesto";
const OFFER: &str = ".ofertado";
const MONTO: &str = "input[name='monto']";

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn agent() -> AgentConfig {
    // Short action timeout keeps the negative-verification tests bounded.
    AgentConfig { action_timeout_secs: 1, ..AgentConfig::default() }
}

fn wherex_target() -> TargetConfig {
    TargetConfig {
        name: "WherEX".to_string(),
        slug: "wherex".to_string(),
        enabled: true,
        login_url: "https://login.example.test".to_string(),
        search_url: "https://market.example.test/licitaciones".to_string(),
        selectors: SelectorsConfig {
            search_box: SEARCH.to_string(),
            result_card: CARD.to_string(),
            budget: Some(BUDGET.to_string()),
            current_offer: Some(OFFER.to_string()),
            offer_input: Some(MONTO.to_string()),
        },
        amount_locale: AmountLocale::CommaDecimal,
        auth: AuthConfig::Form {
            user_env: "SUBFLOW_UNUSED_USER".to_string(),
            pass_env: "SUBFLOW_UNUSED_PASS".to_string(),
            user_field: "input[name='email']".to_string(),
            pass_field: "input[name='password']".to_string(),
            login_labels: vec!["Ingresar".to_string()],
            authenticated_marker: "Licitaciones".to_string(),
        },
        labels: LabelsConfig::default(),
    }
}

/// Page with one result card, published amounts, and the standard
/// apply/confirm chain ending in a confirmation text.
fn candidate_page(title: &str, budget: &str, offer: &str) -> MockDriver {
    MockDriver::new()
        .with_text(CARD, title)
        .with_attr(CARD, "href", "https://market.example.test/lic/841")
        .with_clickable(CARD)
        .with_text(BUDGET, budget)
        .with_text(OFFER, offer)
        .with_action("Postular")
        .with_reveal("Postular", Reveal::actions(&["Confirmar"]))
        .with_reveal("Confirmar", Reveal::texts(&["Oferta enviada"]))
}

fn form_credentials() -> Credentials {
    Credentials::Form {
        username: SecretString::new("proveedor@example.test".to_string()),
        password: SecretString::new("hunter2".to_string()),
    }
}

async fn run_keyword(
    driver: &MockDriver,
    target: &TargetConfig,
    entry: &KeywordEntry,
) -> AttemptResult {
    let screening = Screening::new(ExclusionSet::default());
    let policy = BidPolicy::default();
    let agent = agent();
    let mut engine =
        SubmissionEngine::new(Box::new(driver.clone()), target, &screening, &policy, &agent);
    engine.run_keyword(entry).await
}

// ---------------------------------------------------------------------------
// Happy paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_application_is_confirmed() {
    let driver = candidate_page("Sillas de oficina ergonómicas", "$1.000.000", "$1.000.000");
    let target = wherex_target();

    let result = run_keyword(&driver, &target, &KeywordEntry::new("sillas de oficina")).await;

    assert_eq!(result.status, AttemptStatus::Applied);
    assert_eq!(result.reason, None);
    assert_eq!(result.score, Some(dec!(100)));
    assert_eq!(result.evidence_refs.len(), 2);
    assert!(result.evidence_refs[0].contains("_before"));
    assert!(result.evidence_refs[1].contains("_after"));

    assert_eq!(driver.action_clicks(), vec!["Postular", "Confirmar"]);
    let fills = driver.fills();
    assert!(fills.contains(&(SEARCH.to_string(), "sillas de oficina".to_string())));
    // Amounts were within tolerance, so the offer field was never touched.
    assert!(!fills.iter().any(|(sel, _)| sel == MONTO));
}

#[tokio::test]
async fn test_overshot_offer_is_adjusted_before_submission() {
    // Offer at 1.25x budget trips the overshoot rule; the engine rewrites
    // it to 95% of budget before applying.
    let driver = candidate_page("Sillas de oficina ergonómicas", "$1.000.000", "$1.250.000");
    let target = wherex_target();

    let result = run_keyword(&driver, &target, &KeywordEntry::new("sillas de oficina")).await;

    assert_eq!(result.status, AttemptStatus::AdjustedAndApplied);
    assert!(driver.fills().contains(&(MONTO.to_string(), "950000".to_string())));
    assert_eq!(driver.action_clicks(), vec!["Postular", "Confirmar"]);
}

#[tokio::test]
async fn test_threshold_boundary_still_applies() {
    // Score exactly at the configured threshold passes; the amounts are
    // within tolerance so it submits unadjusted.
    let driver = candidate_page("Sillas de oficina", "$1.000.000", "$1.000.000");
    let target = wherex_target();
    let entry = KeywordEntry::with_threshold("sillas gamer", dec!(50));

    let result = run_keyword(&driver, &target, &entry).await;

    assert_eq!(result.status, AttemptStatus::Applied);
    assert_eq!(result.score, Some(dec!(50)));
}

// ---------------------------------------------------------------------------
// Screening outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_banned_keyword_never_reaches_marketplace() {
    let driver = MockDriver::new();
    let target = wherex_target();

    let result = run_keyword(&driver, &target, &KeywordEntry::new("tazones con logo")).await;

    assert_eq!(result.status, AttemptStatus::Omitted);
    assert_eq!(result.reason.as_deref(), Some("exclusion_logo"));
    assert!(driver.gotos().is_empty());
    assert!(driver.fills().is_empty());
}

#[tokio::test]
async fn test_excluded_listing_title_is_omitted() {
    let driver = candidate_page("Tazones impresos con logo corporativo", "$500.000", "$500.000");
    let target = wherex_target();

    let result = run_keyword(&driver, &target, &KeywordEntry::new("tazones")).await;

    assert_eq!(result.status, AttemptStatus::Omitted);
    assert_eq!(result.reason.as_deref(), Some("exclusion_logo_titulo"));
    // Screened out before the card was ever opened.
    assert!(driver.clicks().is_empty());
    assert!(result.evidence_refs.is_empty());
}

#[tokio::test]
async fn test_below_threshold_is_no_match() {
    let driver = candidate_page("Sillas de oficina", "$1.000.000", "$1.000.000");
    let target = wherex_target();

    let result = run_keyword(&driver, &target, &KeywordEntry::new("sillas gamer")).await;

    assert_eq!(result.status, AttemptStatus::NoMatch);
    assert_eq!(result.score, Some(dec!(50)));
    assert!(result.reason.as_deref().unwrap_or("").contains("below threshold"));
    assert!(driver.clicks().is_empty());
}

#[tokio::test]
async fn test_empty_listing_is_no_results() {
    let driver = MockDriver::new();
    let target = wherex_target();

    let result = run_keyword(&driver, &target, &KeywordEntry::new("sillas de oficina")).await;

    assert_eq!(result.status, AttemptStatus::NoResults);
    assert_eq!(driver.gotos().len(), 1);
    assert!(driver.clicks().is_empty());
}

// ---------------------------------------------------------------------------
// Candidate dead ends
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_amounts_yield_candidate() {
    // Card exists but the page publishes no budget or current offer.
    let driver = MockDriver::new()
        .with_text(CARD, "Sillas de oficina ergonómicas")
        .with_clickable(CARD)
        .with_action("Postular");
    let target = wherex_target();

    let result = run_keyword(&driver, &target, &KeywordEntry::new("sillas de oficina")).await;

    assert_eq!(result.status, AttemptStatus::Candidate);
    assert_eq!(result.reason.as_deref(), Some("insufficient amounts"));
    assert_eq!(result.evidence_refs.len(), 1);
    assert!(driver.action_clicks().is_empty());
}

#[tokio::test]
async fn test_already_applied_short_circuits() {
    let driver = candidate_page("Sillas de oficina ergonómicas", "$1.000.000", "$1.000.000")
        .with_visible("Ya estás participando");
    let target = wherex_target();

    let result = run_keyword(&driver, &target, &KeywordEntry::new("sillas de oficina")).await;

    assert_eq!(result.status, AttemptStatus::Candidate);
    assert_eq!(result.reason.as_deref(), Some("already_applied"));
    assert!(driver.action_clicks().is_empty());
}

#[tokio::test]
async fn test_apply_action_missing_after_adjustment() {
    // Adjustment path skips the already-applied check, so a page with no
    // apply action settles as a candidate with its own reason.
    let driver = MockDriver::new()
        .with_text(CARD, "Sillas de oficina ergonómicas")
        .with_clickable(CARD)
        .with_text(BUDGET, "$1.000.000")
        .with_text(OFFER, "$1.250.000");
    let target = wherex_target();

    let result = run_keyword(&driver, &target, &KeywordEntry::new("sillas de oficina")).await;

    assert_eq!(result.status, AttemptStatus::Candidate);
    assert_eq!(result.reason.as_deref(), Some("apply_action_not_found"));
    // The offer was rewritten before the dead end was discovered.
    assert!(driver.fills().contains(&(MONTO.to_string(), "950000".to_string())));
}

// ---------------------------------------------------------------------------
// Submission failure modes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unconfirmed_submission_reports_attempted() {
    // The apply click lands but the page never acknowledges: no
    // confirmation vocabulary, apply action still present.
    let driver = candidate_page("Sillas de oficina ergonómicas", "$1.000.000", "$1.000.000")
        .with_reveal("Postular", Reveal::sticky())
        .with_reveal("Confirmar", Reveal::default());
    let target = wherex_target();

    let result = run_keyword(&driver, &target, &KeywordEntry::new("sillas de oficina")).await;

    assert_eq!(result.status, AttemptStatus::Attempted);
    assert_eq!(result.reason.as_deref(), Some("submission not confirmed"));
    assert_eq!(result.evidence_refs.len(), 2);
}

#[tokio::test]
async fn test_unclickable_result_card_is_error() {
    let driver = MockDriver::new().with_text(CARD, "Sillas de oficina ergonómicas");
    let target = wherex_target();

    let result = run_keyword(&driver, &target, &KeywordEntry::new("sillas de oficina")).await;

    assert_eq!(result.status, AttemptStatus::Error);
    assert_eq!(result.reason.as_deref(), Some("result card not clickable"));
}

#[tokio::test]
async fn test_driver_fault_settles_as_error_result() {
    let driver = candidate_page("Sillas de oficina ergonómicas", "$1.000.000", "$1.000.000");
    driver.set_error("connection reset by page");
    let target = wherex_target();

    let result = run_keyword(&driver, &target, &KeywordEntry::new("sillas de oficina")).await;

    assert_eq!(result.status, AttemptStatus::Error);
    assert!(result.reason.as_deref().unwrap_or("").contains("connection reset by page"));
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_form_login_clicks_label_and_lands() {
    let driver = MockDriver::new()
        .with_action("Ingresar")
        .with_visible("Licitaciones");
    let target = wherex_target();
    let screening = Screening::new(ExclusionSet::default());
    let policy = BidPolicy::default();
    let cfg = agent();
    let mut engine =
        SubmissionEngine::new(Box::new(driver.clone()), &target, &screening, &policy, &cfg);

    engine.login(&form_credentials()).await.unwrap();

    assert_eq!(engine.phase(), SubmissionPhase::Browsing);
    assert_eq!(driver.action_clicks(), vec!["Ingresar"]);
    let fills = driver.fills();
    assert!(fills.contains(&("input[name='email']".to_string(), "proveedor@example.test".to_string())));
    assert!(fills.iter().any(|(sel, _)| sel == "input[name='password']"));
}

#[tokio::test]
async fn test_form_login_falls_back_to_enter_key() {
    // No login button anywhere; submitting the password field works too.
    let driver = MockDriver::new().with_visible("Licitaciones");
    let target = wherex_target();
    let screening = Screening::new(ExclusionSet::default());
    let policy = BidPolicy::default();
    let cfg = agent();
    let mut engine =
        SubmissionEngine::new(Box::new(driver.clone()), &target, &screening, &policy, &cfg);

    engine.login(&form_credentials()).await.unwrap();

    assert_eq!(driver.enters(), vec!["input[name='password']".to_string()]);
}

#[tokio::test]
async fn test_login_without_marker_is_fatal() {
    let driver = MockDriver::new().with_action("Ingresar");
    let target = wherex_target();
    let screening = Screening::new(ExclusionSet::default());
    let policy = BidPolicy::default();
    let cfg = agent();
    let mut engine =
        SubmissionEngine::new(Box::new(driver.clone()), &target, &screening, &policy, &cfg);

    let err = engine.login(&form_credentials()).await.unwrap_err();

    match err {
        TaskError::Login(msg) => assert!(msg.contains("never appeared")),
        other => panic!("expected login failure, got {other}"),
    }
    assert_eq!(engine.phase(), SubmissionPhase::ErrorTerminal);
}

#[tokio::test]
async fn test_cookie_login_installs_session_artifact() {
    let driver = MockDriver::new();
    let mut target = wherex_target();
    target.auth = AuthConfig::SessionCookie {
        cookie_name: "ticket".to_string(),
        cookie_env_any: vec!["SUBFLOW_UNUSED_TICKET".to_string()],
        authenticated_marker: None,
    };
    let screening = Screening::new(ExclusionSet::default());
    let policy = BidPolicy::default();
    let cfg = agent();
    let mut engine =
        SubmissionEngine::new(Box::new(driver.clone()), &target, &screening, &policy, &cfg);

    let creds = Credentials::SessionCookie { value: SecretString::new("tkt-1".to_string()) };
    engine.login(&creds).await.unwrap();

    assert_eq!(driver.cookies(), vec![("ticket".to_string(), "tkt-1".to_string())]);
    assert_eq!(
        driver.gotos(),
        vec![target.login_url.clone(), target.search_url.clone()],
    );
}
