//! Record command implementations.
//!
//! `record save` and `record delete` go through the [`SyncEngine`], so a
//! configured and enabled type is mirrored to its remote table as part of
//! the command.

use crate::cli::commands::{build_engine, load_registry, open_storage};
use crate::cli::{RecordCommands, RecordSaveArgs};
use crate::error::{Error, Result};
use crate::model::{EntitySchema, Record};
use crate::remote::FieldMap;
use crate::storage::SqliteStorage;
use crate::sync::{Notice, NoticeLevel, PushOutcome, SyncEngine};
use crate::validate::ValidatorSet;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Serialize)]
struct WriteOutput {
    record: Value,
    outcome: PushOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<Notice>,
}

#[derive(Serialize)]
struct ShowOutput {
    record: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

#[derive(Serialize)]
struct ListOutput {
    entity_type: String,
    count: usize,
    records: Vec<Value>,
}

/// Execute record commands.
///
/// # Errors
///
/// Returns an error if the database or settings cannot be opened, the
/// record does not exist, or the fields do not validate.
pub fn execute(
    command: &RecordCommands,
    config_path: Option<&PathBuf>,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let (settings, registry) = load_registry(config_path)?;
    let mut storage = open_storage(db_path, actor)?;
    let engine = build_engine(&settings, registry)?;

    match command {
        RecordCommands::Save(args) => save(&mut storage, &engine, args, json),
        RecordCommands::Delete {
            entity_type,
            id,
            no_push,
        } => delete(&mut storage, &engine, entity_type, *id, *no_push, json),
        RecordCommands::Show { entity_type, id } => show(&storage, &engine, entity_type, *id, json),
        RecordCommands::List { entity_type } => list(&storage, entity_type, json),
    }
}

fn save(
    storage: &mut SqliteStorage,
    engine: &SyncEngine,
    args: &RecordSaveArgs,
    json: bool,
) -> Result<()> {
    let registry = engine.registry();
    let (schema, validator_name) = match registry.get(&args.entity_type) {
        Some(resolved) => (resolved.schema.clone(), resolved.config.validator.clone()),
        None => (
            EntitySchema {
                entity_type: args.entity_type.clone(),
                ..EntitySchema::default()
            },
            "passthrough".to_string(),
        ),
    };
    let validator = ValidatorSet::default()
        .resolve(&validator_name)
        .ok_or_else(|| Error::Config(format!("Unknown validator '{validator_name}'")))?;

    let mut record = match args.id {
        Some(id) => load_record(storage, &args.entity_type, id)?,
        None => Record::for_schema(&schema),
    };

    let mut fields = current_fields(&record);
    for assignment in &args.set {
        let (name, value) = parse_assignment(assignment)?;
        fields.insert(name, value);
    }
    if args.no_push {
        record.sync.push_to_remote = false;
    }

    let outcome = storage.atomic(|storage| {
        let cleaned = validator
            .validate(&schema, &fields, storage)
            .map_err(Error::Validation)?;
        record.apply_fields(&schema, &cleaned);
        engine.save(storage, &mut record)
    })?;

    let url = engine.record_url(&mut record);
    let notice = Notice::for_save(&outcome, registry.push_message(), url);

    if json {
        let output = WriteOutput {
            record: record.to_json(),
            outcome,
            notice,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!(
            "Saved {} #{}",
            record.entity_type,
            record.id.unwrap_or_default()
        );
        print_notice(notice.as_ref());
    }

    Ok(())
}

fn delete(
    storage: &mut SqliteStorage,
    engine: &SyncEngine,
    entity_type: &str,
    id: i64,
    no_push: bool,
    json: bool,
) -> Result<()> {
    let mut record = load_record(storage, entity_type, id)?;
    if no_push {
        record.sync.push_to_remote = false;
    }

    let outcome = engine.delete(storage, &mut record)?;
    let notice = Notice::for_delete(std::slice::from_ref(&outcome), engine.registry().push_message());

    if json {
        let output = WriteOutput {
            record: record.to_json(),
            outcome,
            notice,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Deleted {entity_type} #{id}");
        print_notice(notice.as_ref());
    }

    Ok(())
}

fn show(
    storage: &SqliteStorage,
    engine: &SyncEngine,
    entity_type: &str,
    id: i64,
    json: bool,
) -> Result<()> {
    let mut record = load_record(storage, entity_type, id)?;
    let url = engine.record_url(&mut record);

    if json {
        let output = ShowOutput {
            record: record.to_json(),
            url,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{} #{id}", entity_type.cyan().bold());
    let external = record.external_record_id();
    println!(
        "  Remote:  {}",
        if external.is_empty() { "-".dimmed().to_string() } else { external.to_string() }
    );
    if let Some(url) = url {
        println!("  Link:    {url}");
    }
    for (name, value) in &record.values {
        println!("  {name}: {}", display_value(value));
    }
    for (name, labels) in &record.relations {
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        println!("  {name}: {}", labels.join(", "));
    }
    if let Some(tree) = &record.tree {
        println!(
            "  Tree:    parent={} live={} locked={} unpublished={}",
            tree.parent_id.map_or_else(|| "-".to_string(), |p| p.to_string()),
            tree.live,
            tree.locked,
            tree.has_unpublished_changes
        );
    }

    Ok(())
}

fn list(storage: &SqliteStorage, entity_type: &str, json: bool) -> Result<()> {
    let records = storage.list_records(entity_type)?;

    if json {
        let output = ListOutput {
            entity_type: entity_type.to_string(),
            count: records.len(),
            records: records.iter().map(Record::to_json).collect(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No {entity_type} records.");
        return Ok(());
    }

    for record in &records {
        let external = record.external_record_id();
        println!(
            "  #{:<5} {:<18} {}",
            record.id.unwrap_or_default(),
            if external.is_empty() { "-" } else { external },
            serde_json::to_string(&record.values)?.dimmed()
        );
    }

    Ok(())
}

fn load_record(storage: &SqliteStorage, entity_type: &str, id: i64) -> Result<Record> {
    storage
        .get_record(id)?
        .filter(|r| r.entity_type == entity_type)
        .ok_or_else(|| Error::RecordNotFound {
            entity_type: entity_type.to_string(),
            id,
        })
}

/// Stored values and label sets, so an update validates the whole record.
fn current_fields(record: &Record) -> FieldMap {
    let mut fields = record.values.clone();
    for (name, labels) in &record.relations {
        fields.insert(
            name.clone(),
            Value::Array(labels.iter().cloned().map(Value::String).collect()),
        );
    }
    fields
}

/// `FIELD=VALUE`; the value is JSON if it parses, text otherwise.
fn parse_assignment(assignment: &str) -> Result<(String, Value)> {
    let (name, raw) = assignment
        .split_once('=')
        .filter(|(name, _)| !name.trim().is_empty())
        .ok_or_else(|| {
            Error::InvalidArgument(format!("Expected FIELD=VALUE, got '{assignment}'"))
        })?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.trim().to_string(), value))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_notice(notice: Option<&Notice>) {
    let Some(notice) = notice else {
        return;
    };
    match notice.level {
        NoticeLevel::Success => println!("{} {notice}", "✓".green()),
        NoticeLevel::Error => println!("{} {notice}", "✗".red()),
    }
}
