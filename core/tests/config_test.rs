use async_trait::async_trait;
use chrono::{Local, TimeZone};
use domotimer::config::{
    SpecDefinition, TimerDefinition, export_exception_days, import_exception_days, import_timers,
    load_exception_days, status_xml,
};
use domotimer::datetime::WeekdaySet;
use domotimer::errors::TimerErrors;
use domotimer::exceptions::{DaySpec, ExceptionDays};
use domotimer::task::{TimerAction, TimerTask};
use domotimer::timespec::ExceptionPolicy;
use domotimer::variables::{InMemoryVariableSource, VariableSource};
use pretty_assertions::assert_eq;
use std::sync::Arc;

struct NoopAction;

#[async_trait]
impl TimerAction for NoopAction {
    async fn execute(&self, _engaged: bool) -> Result<(), TimerErrors> {
        Ok(())
    }
}

fn epoch(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> i64 {
    Local
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap()
        .timestamp()
}

#[test]
fn imports_the_representative_document() {
    let xml = r#"
        <timers>
          <timer type="periodic">
            <at min="30" hour="8" wdays="Mon,Tue,Wed,Thu,Fri" exception="No"/>
            <until min="0" hour="17"/>
            <during>0</during>
          </timer>
          <timer type="fixed">
            <at min="0" hour="12" mday="25" mon="12"/>
          </timer>
          <timer type="variable">
            <at>
              <time var="sunset_time"/>
              <date var="today"/>
              <offset>-900</offset>
            </at>
          </timer>
        </timers>
    "#;
    let definitions = import_timers(xml).unwrap();
    assert_eq!(definitions.len(), 3);

    let workweek = WeekdaySet::from_names("Mon,Tue,Wed,Thu,Fri").unwrap();
    assert_eq!(
        definitions[0],
        TimerDefinition::Periodic {
            at: SpecDefinition {
                minute: Some(30),
                hour: Some(8),
                weekdays: workweek,
                exception: ExceptionPolicy::No,
                ..SpecDefinition::default()
            },
            until: Some(SpecDefinition {
                minute: Some(0),
                hour: Some(17),
                ..SpecDefinition::default()
            }),
            during: 0,
        }
    );
    assert_eq!(
        definitions[1],
        TimerDefinition::Fixed {
            at: SpecDefinition {
                minute: Some(0),
                hour: Some(12),
                day: Some(25),
                month: Some(12),
                ..SpecDefinition::default()
            },
        }
    );
    assert_eq!(
        definitions[2],
        TimerDefinition::Periodic {
            at: SpecDefinition {
                time_var: Some("sunset_time".to_owned()),
                date_var: Some("today".to_owned()),
                offset: -900,
                ..SpecDefinition::default()
            },
            until: None,
            during: 0,
        }
    );
}

#[test]
fn empty_attributes_are_wildcards() {
    let xml = r#"<timer type="periodic"><at min="0" hour="" mday=""/></timer>"#;
    let definitions = import_timers(xml).unwrap();
    let TimerDefinition::Periodic { at, .. } = &definitions[0] else {
        panic!("expected a periodic definition");
    };
    assert_eq!(at.minute, Some(0));
    assert_eq!(at.hour, None);
    assert_eq!(at.day, None);
}

#[test]
fn malformed_documents_are_rejected() {
    assert!(import_timers(r#"<timer type="sometimes"><at/></timer>"#).is_err());
    assert!(import_timers(r#"<timer type="periodic"></timer>"#).is_err());
    assert!(import_timers(r#"<timer type="periodic"><at wdays="Mon,Nope"/></timer>"#).is_err());
    assert!(import_timers(r#"<timer type="periodic"><at exception="maybe"/></timer>"#).is_err());
    assert!(import_timers(r#"<timer type="periodic"><at min="half past"/></timer>"#).is_err());
}

#[tokio::test]
async fn builds_an_armed_periodic_task() {
    let definitions = import_timers(
        r#"<timer type="periodic"><at min="0" hour="12"/></timer>"#,
    )
    .unwrap();
    let registry = Arc::new(ExceptionDays::new());
    let now = epoch(2024, 6, 10, 11, 0);
    let task = definitions[0]
        .build_task(now, Arc::new(NoopAction), None, &registry)
        .unwrap();
    assert_eq!(task.next_exec_time(), Some(epoch(2024, 6, 10, 12, 0)));
}

#[tokio::test]
async fn builds_a_fixed_task_resolved_at_import_time() {
    let definitions = import_timers(
        r#"<timer type="fixed"><at min="0" hour="12" mday="25" mon="12"/></timer>"#,
    )
    .unwrap();
    let registry = Arc::new(ExceptionDays::new());
    let now = epoch(2024, 6, 10, 11, 0);
    let task = definitions[0]
        .build_task(now, Arc::new(NoopAction), None, &registry)
        .unwrap();
    assert_eq!(task.next_exec_time(), Some(epoch(2024, 12, 25, 12, 0)));
}

#[tokio::test]
async fn variable_definition_requires_a_source() {
    let definitions = import_timers(
        r#"<timer type="variable"><at><time var="sunset_time"/></at></timer>"#,
    )
    .unwrap();
    let registry = Arc::new(ExceptionDays::new());
    let err = definitions[0]
        .build_task(0, Arc::new(NoopAction), None, &registry)
        .unwrap_err();
    assert!(matches!(err, TimerErrors::ConfigParse(_)));

    let source: Arc<dyn VariableSource> = Arc::new(InMemoryVariableSource::new());
    assert!(
        definitions[0]
            .build_task(
                epoch(2024, 6, 10, 11, 0),
                Arc::new(NoopAction),
                Some(&source),
                &registry
            )
            .is_ok()
    );
}

#[tokio::test]
async fn calendar_impossible_definition_builds_no_task() {
    let definitions = import_timers(
        r#"<timer type="periodic"><at mday="30" mon="2"/></timer>"#,
    )
    .unwrap();
    let registry = Arc::new(ExceptionDays::new());
    let err = definitions[0]
        .build_task(0, Arc::new(NoopAction), None, &registry)
        .unwrap_err();
    assert!(matches!(err, TimerErrors::InvalidTimeSpec(_)));
}

#[test]
fn exception_days_import_validates_and_replaces() {
    let xml = r#"
        <exceptiondays>
          <day mday="25" mon="12"/>
          <day mday="1" mon="1" year="2026"/>
        </exceptiondays>
    "#;
    let entries = import_exception_days(xml).unwrap();
    assert_eq!(
        entries,
        vec![
            DaySpec::new(Some(25), Some(12), None),
            DaySpec::new(Some(1), Some(1), Some(2026)),
        ]
    );

    let registry = ExceptionDays::new();
    registry.add_day(DaySpec::new(Some(1), Some(5), None));
    assert_eq!(load_exception_days(xml, &registry).unwrap(), 2);
    assert_eq!(registry.snapshot(), entries);

    // out-of-range entries poison the whole document, the registry stays as is
    let bad = r#"<exceptiondays><day mday="32"/></exceptiondays>"#;
    assert!(load_exception_days(bad, &registry).is_err());
    assert_eq!(registry.snapshot(), entries);
}

#[test]
fn exception_days_export_mirrors_the_registry() {
    let registry = ExceptionDays::new();
    registry.add_day(DaySpec::new(Some(25), Some(12), None));
    registry.add_day(DaySpec::new(Some(1), Some(1), Some(2026)));
    let xml = export_exception_days(&registry).unwrap();
    assert_eq!(
        xml,
        r#"<exceptiondays><day mday="25" mon="12"/><day mday="1" mon="1" year="2026"/></exceptiondays>"#
    );
    // and the exported form imports back to the same entries
    assert_eq!(import_exception_days(&xml).unwrap(), registry.snapshot());
}

#[tokio::test]
async fn status_document_shows_next_firing_and_value() {
    let definitions = import_timers(
        r#"<timer type="periodic"><at min="0" hour="12"/></timer>"#,
    )
    .unwrap();
    let registry = Arc::new(ExceptionDays::new());
    let now = epoch(2024, 6, 10, 11, 0);
    let task = definitions[0]
        .build_task(now, Arc::new(NoopAction), None, &registry)
        .unwrap();

    let xml = status_xml(&[task.status()]).unwrap();
    let expected_instant = Local
        .timestamp_opt(epoch(2024, 6, 10, 12, 0), 0)
        .single()
        .unwrap()
        .to_rfc3339();
    assert!(xml.starts_with("<status>"));
    assert!(xml.contains(&format!(r#"next="{expected_instant}""#)));
    assert!(xml.contains(r#"value="off""#));

    // an inactive task exports an empty timestamp
    task.reschedule(epoch(2024, 6, 10, 11, 0));
    let spent = domotimer::task::FixedTimeTask::builder()
        .exec_time(now)
        .action(NoopAction)
        .build();
    spent.reschedule(now);
    let xml = status_xml(&[spent.status()]).unwrap();
    assert!(xml.contains(r#"next="""#));
}
