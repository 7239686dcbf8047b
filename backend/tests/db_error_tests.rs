//! Tests for db::repository::error module.

use battery_endurance::db::repository::{ErrorContext, RepositoryError, RepositoryResult};

#[test]
fn test_error_context_new() {
    let ctx = ErrorContext::new("submit_ocv");
    assert_eq!(ctx.operation, Some("submit_ocv".to_string()));
    assert!(ctx.entity.is_none());
    assert!(ctx.entity_id.is_none());
    assert!(ctx.details.is_none());
    assert!(!ctx.retryable);
}

#[test]
fn test_error_context_chaining() {
    let ctx = ErrorContext::new("end_phase")
        .with_entity("session")
        .with_entity_id(42)
        .with_details("no active cycle")
        .retryable();

    assert_eq!(ctx.operation, Some("end_phase".to_string()));
    assert_eq!(ctx.entity, Some("session".to_string()));
    assert_eq!(ctx.entity_id, Some("42".to_string()));
    assert_eq!(ctx.details, Some("no active cycle".to_string()));
    assert!(ctx.retryable);
}

#[test]
fn test_error_context_display() {
    let ctx = ErrorContext::new("submit_ccv")
        .with_entity("cycle")
        .with_entity_id("17");

    let display = format!("{}", ctx);
    assert!(display.contains("operation=submit_ccv"));
    assert!(display.contains("entity=cycle"));
    assert!(display.contains("id=17"));
}

#[test]
fn test_error_context_display_with_details_and_retry() {
    let ctx = ErrorContext::new("op").with_details("extra info").retryable();
    let display = format!("{}", ctx);
    assert!(display.contains("details=extra info"));
    assert!(display.contains("retryable=true"));
}

#[test]
fn test_error_context_default_is_empty() {
    let ctx = ErrorContext::default();
    assert!(ctx.operation.is_none());
    assert_eq!(format!("{}", ctx), "[]");
}

// =========================================================
// RepositoryError
// =========================================================

#[test]
fn test_error_messages_carry_kind() {
    let cases = [
        (RepositoryError::not_found("Session 3 not found"), "Not found"),
        (RepositoryError::invalid_input("Expected 4 readings, got 3"), "Invalid input"),
        (RepositoryError::unavailable("pool closed"), "Storage unavailable"),
        (RepositoryError::storage("syntax error at or near"), "Storage error"),
        (RepositoryError::configuration("missing url"), "Configuration error"),
        (RepositoryError::internal("join failed"), "Internal error"),
    ];

    for (err, kind) in cases {
        assert!(err.to_string().starts_with(kind), "{}", err);
    }
}

#[test]
fn test_session_not_found_names_the_session() {
    let err = RepositoryError::session_not_found(7, "end_phase");
    assert!(err.is_not_found());
    assert_eq!(err.context().entity.as_deref(), Some("session"));
    assert_eq!(err.context().entity_id.as_deref(), Some("7"));
    assert!(err.to_string().contains("Session 7 not found"));
    assert!(err.to_string().contains("operation=end_phase"));
}

#[test]
fn test_bank_not_found_names_the_bank() {
    let err = RepositoryError::bank_not_found(3, "get_bank");
    assert!(err.is_not_found());
    assert_eq!(err.context().entity.as_deref(), Some("bank"));
    assert!(err.to_string().contains("Battery bank 3 not found"));
}

#[test]
fn test_unavailable_with_context_is_retryable() {
    let ctx = ErrorContext::new("connect").with_entity("database");
    let err = RepositoryError::unavailable_with_context("failed to connect", ctx);
    let err_str = err.to_string();
    assert!(err_str.contains("failed to connect"));
    assert!(err_str.contains("operation=connect"));
    assert!(err.is_retryable());
}

#[test]
fn test_retryable_kinds() {
    assert!(RepositoryError::unavailable("temp failure").is_retryable());
    assert!(!RepositoryError::storage("constraint").is_retryable());
    assert!(!RepositoryError::not_found("missing").is_retryable());
    assert!(!RepositoryError::invalid_input("invalid").is_retryable());
    assert!(!RepositoryError::configuration("bad").is_retryable());
    assert!(!RepositoryError::internal("decode").is_retryable());
}

#[test]
fn test_retryable_flag_only_counts_for_storage_kinds() {
    let ctx = ErrorContext::new("submit_ocv").retryable();
    assert!(!RepositoryError::invalid_input_with_context("full", ctx.clone()).is_retryable());
    assert!(!RepositoryError::internal_with_context("join", ctx).is_retryable());
}

#[test]
fn test_kind_predicates() {
    assert!(RepositoryError::not_found("x").is_not_found());
    assert!(!RepositoryError::not_found("x").is_invalid_input());
    assert!(RepositoryError::invalid_input("x").is_invalid_input());
    assert!(!RepositoryError::internal("not found").is_not_found());
}

#[test]
fn test_with_operation_overrides_context() {
    let err = RepositoryError::session_not_found(1, "get_session").with_operation("get_export_csv");
    assert_eq!(err.context().operation.as_deref(), Some("get_export_csv"));
    assert!(err.to_string().contains("operation=get_export_csv"));
    assert_eq!(err.context().entity.as_deref(), Some("session"));
}

#[test]
fn test_repository_result_alias() {
    let ok: RepositoryResult<u32> = Ok(2);
    assert_eq!(ok.unwrap(), 2);
    let err: RepositoryResult<u32> = Err(RepositoryError::not_found("test"));
    assert!(err.unwrap_err().is_not_found());
}
