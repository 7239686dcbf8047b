//! Tests for db::factory and db::repo_config - backend selection and
//! configuration files.

mod support;

use std::io::Write;
use std::str::FromStr;

use battery_endurance::db::factory::{RepositoryFactory, RepositoryType};
use battery_endurance::db::repo_config::RepositoryConfig;
use battery_endurance::db::repository::{ReadingRepository, SessionRepository};
use battery_endurance::api::NewBatteryBank;

#[test]
fn test_repository_type_from_str() {
    assert_eq!(
        RepositoryType::from_str("POSTGRES").unwrap(),
        RepositoryType::Postgres
    );
    assert_eq!(
        RepositoryType::from_str("pg").unwrap(),
        RepositoryType::Postgres
    );
    assert_eq!(
        RepositoryType::from_str("LOCAL").unwrap(),
        RepositoryType::Local
    );
}

#[test]
fn test_repository_type_from_str_invalid() {
    let result = RepositoryType::from_str("invalid");
    assert!(result.unwrap_err().contains("Unknown repository type"));
}

#[test]
fn test_repository_type_from_env_default() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", None),
            ("DATABASE_URL", None),
            ("PG_DATABASE_URL", None),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Local);
        },
    );
}

#[test]
fn test_repository_type_from_env_with_database_url() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", None),
            ("DATABASE_URL", Some("postgres://localhost/endurance")),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Postgres);
        },
    );
}

#[test]
fn test_repository_type_from_env_with_pg_database_url() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", None),
            ("DATABASE_URL", None),
            ("PG_DATABASE_URL", Some("postgres://localhost/endurance")),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Postgres);
        },
    );
}

#[test]
fn test_repository_type_from_env_explicit_wins_over_url() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", Some("local")),
            ("DATABASE_URL", Some("postgres://localhost/endurance")),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Local);
        },
    );
}

#[test]
fn test_repository_type_from_env_invalid_defaults_to_local() {
    support::with_scoped_env(&[("REPOSITORY_TYPE", Some("invalid"))], || {
        assert_eq!(RepositoryType::from_env(), RepositoryType::Local);
    });
}

// =========================================================
// Factory
// =========================================================

#[tokio::test]
async fn test_local_repositories_are_independent() {
    let a = RepositoryFactory::create(RepositoryType::Local, None)
        .await
        .unwrap();
    let b = RepositoryFactory::create_local();

    let bank = NewBatteryBank::new("Bank A", None, 2);
    let info = a.create_session(&bank, 1).await.unwrap();
    a.submit_ocv(info.session_id, &[3.7, 3.7], None).await.unwrap();

    assert_eq!(a.list_sessions().await.unwrap().len(), 1);
    assert!(b.list_sessions().await.unwrap().is_empty());
}

#[cfg(feature = "postgres-repo")]
#[tokio::test]
async fn test_create_postgres_without_config_fails() {
    let err = RepositoryFactory::create(RepositoryType::Postgres, None)
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("requires PostgresConfig"));
}

#[cfg(not(feature = "postgres-repo"))]
#[tokio::test]
async fn test_create_postgres_without_feature_fails() {
    let err = RepositoryFactory::create(RepositoryType::Postgres, None)
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("feature not enabled"));
}

// =========================================================
// repository.toml
// =========================================================

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_from_config_file_local() {
    let file = write_config("[repository]\ntype = \"local\"\n");
    let repo = RepositoryFactory::from_config_file(file.path())
        .await
        .unwrap();
    assert!(repo.health_check().await.unwrap());
}

#[tokio::test]
async fn test_from_config_file_missing_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = RepositoryFactory::from_config_file(dir.path().join("repository.toml"))
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[tokio::test]
async fn test_from_config_file_unknown_type() {
    let file = write_config("[repository]\ntype = \"sqlite\"\n");
    let err = RepositoryFactory::from_config_file(file.path())
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("Invalid repository type"));
}

#[tokio::test]
async fn test_config_search_rejects_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("repository.toml");
    std::fs::write(&path, "[repository\ntype = \"postgres\"").unwrap();

    let err = RepositoryFactory::from_config_search(&[dir.path().join("absent.toml"), path])
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[tokio::test]
async fn test_config_search_rejects_unknown_type() {
    let file = write_config("[repository]\ntype = \"mongo\"\n");
    let err = RepositoryFactory::from_config_search(&[file.path()])
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("Invalid repository type"));
}

#[tokio::test]
async fn test_config_search_uses_first_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_config("[repository]\ntype = \"local\"\n");
    let repo = RepositoryFactory::from_config_search(&[
        dir.path().join("repository.toml"),
        file.path().to_path_buf(),
    ])
    .await
    .unwrap();
    assert!(repo.health_check().await.unwrap());
}

#[test]
fn test_config_search_without_files_selects_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let candidates = [dir.path().join("repository.toml")];
    assert!(RepositoryConfig::find_config_file(&candidates).is_none());

    let healthy = support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", Some("local")),
            ("DATABASE_URL", None),
            ("PG_DATABASE_URL", None),
        ],
        || {
            tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap()
                .block_on(async {
                    let repo = RepositoryFactory::from_config_search(&candidates)
                        .await
                        .unwrap();
                    repo.health_check().await.unwrap()
                })
        },
    );
    assert!(healthy);
}

#[test]
fn test_config_file_parse_error_names_path() {
    let file = write_config("[repository\ntype = local");
    let err = RepositoryConfig::from_file(file.path()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Failed to parse config file"));
    assert!(message.contains(&file.path().display().to_string()));
}

#[test]
fn test_resolved_database_url_falls_back_to_env() {
    let config = RepositoryConfig::from_toml_str("[repository]\ntype = \"postgres\"\n").unwrap();
    support::with_scoped_env(
        &[
            ("DATABASE_URL", None),
            ("PG_DATABASE_URL", Some("postgres://env/endurance")),
        ],
        || {
            assert_eq!(
                config.postgres.resolved_database_url().as_deref(),
                Some("postgres://env/endurance")
            );
        },
    );
    support::with_scoped_env(
        &[("DATABASE_URL", None), ("PG_DATABASE_URL", None)],
        || {
            assert!(config.postgres.resolved_database_url().is_none());
        },
    );
}
