//! End-to-end session lifecycle through the service layer.

use battery_endurance::api::{CycleStatus, ElapsedTime, ExportColumn, Phase, SessionStatus};
use battery_endurance::db::repositories::LocalRepository;
use battery_endurance::db::repository::ReadingRepository;
use battery_endurance::db::services;

#[tokio::test]
async fn test_three_cell_two_cycle_session() {
    let repo = LocalRepository::new();
    let info = services::create_test_session(&repo, "Bank A", Some("rack 2".into()), 3, 2)
        .await
        .unwrap();
    let id = info.session_id;

    // Cycle 1 charge: OCV opens the cycle and starts the session.
    let ocv = services::submit_ocv(&repo, id, &[3.70, 3.71, 3.69], None)
        .await
        .unwrap();
    assert!(ocv.cycle_created);
    assert!(ocv.session_started);
    assert_eq!(ocv.cycle.cycle_number, 1);
    assert_eq!(ocv.cycle.phase, Phase::Charge);
    assert_eq!(ocv.session.status, SessionStatus::InProgress);
    assert_eq!(ocv.readings_recorded, 3);

    let ccv = services::submit_ccv(&repo, id, &[3.60, 3.61, 3.59])
        .await
        .unwrap();
    assert_eq!(ccv.sequence_number, 1);
    assert_eq!(ccv.cycle.id, ocv.cycle.id);

    let t = services::end_phase(&repo, id).await.unwrap();
    assert_eq!((t.step.to_cycle, t.step.to_phase), (1, Phase::Discharge));
    assert!(!t.step.session_completed);

    // Cycle 1 discharge.
    services::submit_ocv(&repo, id, &[3.50, 3.52, 3.49], None)
        .await
        .unwrap();
    let t = services::end_phase(&repo, id).await.unwrap();
    assert_eq!((t.step.to_cycle, t.step.to_phase), (2, Phase::Charge));

    // Cycle 2 charge and discharge.
    services::submit_ocv(&repo, id, &[3.71, 3.72, 3.70], None)
        .await
        .unwrap();
    let t = services::end_phase(&repo, id).await.unwrap();
    assert_eq!((t.step.to_cycle, t.step.to_phase), (2, Phase::Discharge));
    assert_eq!(t.session.status, SessionStatus::InProgress);

    services::submit_ocv(&repo, id, &[3.48, 3.50, 3.47], None)
        .await
        .unwrap();
    let t = services::end_phase(&repo, id).await.unwrap();
    assert!(t.step.session_completed);
    assert_eq!(t.session.current_cycle, 3);
    assert_eq!(t.session.status, SessionStatus::Completed);

    // Every cycle is closed.
    let cycles = repo.list_cycles(id).await.unwrap();
    assert_eq!(cycles.len(), 4);
    assert!(cycles.iter().all(|c| c.status == CycleStatus::Completed));
    assert!(repo.get_active_cycle(id).await.unwrap().is_none());

    // Report
    let report = services::get_session_report(&repo, id).await.unwrap();
    assert_eq!(report.progress, Some(100.0));
    assert_eq!(report.status_label, "Completed");
    assert!(matches!(report.duration, ElapsedTime::Elapsed { .. }));
    assert!(report
        .cycles
        .iter()
        .all(|c| matches!(c.duration, ElapsedTime::Elapsed { .. })));

    // Export: 4 cycle phases x 3 cells.
    let export = services::get_export_table(&repo, id).await.unwrap();
    assert_eq!(export.rows.len(), 12);
    assert_eq!(export.columns, vec![ExportColumn::Ocv, ExportColumn::Ccv(1)]);
    let first = &export.rows[0];
    assert_eq!((first.cycle, first.phase, first.cell), (1, Phase::Charge, 1));
    assert_eq!(first.ocv.as_f64(), Some(3.70));
    assert_eq!(first.get(ExportColumn::Ccv(1)).as_f64(), Some(3.60));
    let discharge = &export.rows[3];
    assert_eq!((discharge.cycle, discharge.phase), (1, Phase::Discharge));
    assert!(discharge.get(ExportColumn::Ccv(1)).is_missing());

    // Nothing more is accepted.
    let err = services::submit_ocv(&repo, id, &[3.7, 3.7, 3.7], None)
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());
}

#[tokio::test]
async fn test_progress_through_phases() {
    let repo = LocalRepository::new();
    let info = services::create_test_session(&repo, "Bank B", None, 1, 2)
        .await
        .unwrap();
    let id = info.session_id;

    let mut seen = Vec::new();
    for _ in 0..4 {
        services::submit_ocv(&repo, id, &[3.7], None).await.unwrap();
        let t = services::end_phase(&repo, id).await.unwrap();
        seen.push(battery_endurance::services::progress(&t.session));
    }
    assert_eq!(
        seen,
        vec![Some(25.0), Some(50.0), Some(75.0), Some(100.0)]
    );
}

#[tokio::test]
async fn test_ccv_sequences_and_interval() {
    let repo = LocalRepository::new();
    let info = services::create_test_session(&repo, "Bank C", None, 2, 1)
        .await
        .unwrap();
    let id = info.session_id;

    let ocv = services::submit_ocv(&repo, id, &[3.7, 3.7], Some(300))
        .await
        .unwrap();
    assert_eq!(ocv.cycle.ccv_interval, Some(300));

    for expected in 1..=4 {
        let ccv = services::submit_ccv(&repo, id, &[3.6, 3.6]).await.unwrap();
        assert_eq!(ccv.sequence_number, expected);
    }

    // A second OCV reuses the cycle and keeps its interval.
    let again = services::submit_ocv(&repo, id, &[3.65, 3.66], Some(60))
        .await
        .unwrap();
    assert!(!again.cycle_created);
    assert_eq!(again.cycle.ccv_interval, Some(300));

    let tables = services::get_cycle_tables(&repo, id).await.unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].ccv_columns.len(), 4);
    // Earliest OCV wins.
    assert_eq!(tables[0].rows[0].ocv.as_f64(), Some(3.7));
}

#[tokio::test]
async fn test_dashboard_lists_newest_first() {
    let repo = LocalRepository::new();
    let first = services::create_test_session(&repo, "Old bank", None, 2, 1)
        .await
        .unwrap();
    let second = services::create_test_session(&repo, "New bank", None, 4, 3)
        .await
        .unwrap();

    let summaries = services::list_session_summaries(&repo).await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].session_id, second.session_id);
    assert_eq!(summaries[0].bank_name, "New bank");
    assert_eq!(summaries[0].status_label, "Scheduled");
    assert_eq!(summaries[0].progress, Some(0.0));
    assert_eq!(summaries[1].session_id, first.session_id);
}
