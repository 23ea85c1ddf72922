use std::io::Read;
use std::path::Path;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io::{self, LoadedConfig};
use crate::io::delim::{format_table, parse_table};
use crate::io::editor::{EditOutcome, edit_record, resolve_editor};
use crate::io::logging::init_logging;
use crate::io::recovery::read_recovery_entries;
use crate::model::{Config, NodeId, Record, STATUS_OPEN};
use crate::ops::list::TaskList;
use crate::ops::screen::Screen;
use crate::ops::sync::Store;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let loaded = load_context(cli.config.as_deref())?;

    match cli.command {
        None | Some(Commands::View) => crate::tui::run(&loaded),
        Some(Commands::Init(args)) => cmd_init(&loaded, args),

        // Read commands
        Some(Commands::List(args)) => cmd_list(&loaded, args, json),
        Some(Commands::Show(args)) => cmd_show(&loaded, args, json),
        Some(Commands::Export) => cmd_export(&loaded),
        Some(Commands::Recovery(args)) => cmd_recovery(&loaded, args, json),

        // Write commands
        Some(Commands::Add(args)) => cmd_add(&loaded, args),
        Some(Commands::Edit(args)) => cmd_edit(&loaded, args),
        Some(Commands::Done(args)) => cmd_done(&loaded, args),
        Some(Commands::Rm(args)) => cmd_rm(&loaded, args),
        Some(Commands::Mv(args)) => cmd_mv(&loaded, args),
        Some(Commands::Import(args)) => cmd_import(&loaded, args, json),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Locate and read the config, then start file logging next to it
pub fn load_context(explicit: Option<&Path>) -> Result<LoadedConfig, Box<dyn std::error::Error>> {
    let path = config_io::discover_config_path(explicit)?;
    let loaded = config_io::load_config(&path)?;
    if let Err(e) = init_logging(&loaded.log_path(), &loaded.config.log.level) {
        eprintln!("warning: logging disabled: {}", e);
    }
    Ok(loaded)
}

/// Open the configured backend and read the whole list
fn open_list(loaded: &LoadedConfig) -> Result<(Store, TaskList), Box<dyn std::error::Error>> {
    let mut store = Store::open(loaded, false)?;
    let (list, report) = store.load()?;
    for (record, err) in &report.skipped {
        eprintln!("warning: skipped task {}: {}", record.value("id"), err);
    }
    Ok((store, list))
}

fn find_task(list: &TaskList, id: &str) -> Result<NodeId, Box<dyn std::error::Error>> {
    list.find_by_id(id)
        .ok_or_else(|| format!("task not found: {}", id).into())
}

/// Parse `key=value` pairs given with --set
fn parse_assignments(pairs: &[String]) -> Result<Vec<(String, String)>, String> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key.trim() == "id" => Err("the id cannot be set".to_string()),
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(format!("expected KEY=VALUE, got '{}'", pair)),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Init
// ---------------------------------------------------------------------------

fn cmd_init(loaded: &LoadedConfig, args: InitArgs) -> CmdResult {
    if config_io::write_config(&loaded.path, &Config::default(), args.force)? {
        println!("wrote {}", loaded.path.display());
    }
    // Re-read so relative paths in a freshly written config resolve the same way
    let loaded = config_io::load_config(&loaded.path)?;
    let mut store = Store::open(&loaded, true)?;
    store.init()?;
    println!("initialized {}", store.describe());
    Ok(())
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

fn cmd_list(loaded: &LoadedConfig, args: ListArgs, json: bool) -> CmdResult {
    let (_store, list) = open_list(loaded)?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&categories_to_json(&list, args.all))?
        );
        return Ok(());
    }
    let lines = if args.all {
        format_all(&list)
    } else {
        format_screen(&list, &Screen::project(&list))
    };
    for line in &lines {
        println!("{}", line);
    }
    Ok(())
}

fn cmd_show(loaded: &LoadedConfig, args: IdArgs, json: bool) -> CmdResult {
    let (_store, list) = open_list(loaded)?;
    let record = &list[find_task(&list, &args.id)?].record;
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
    } else {
        for line in format_record(record) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_export(loaded: &LoadedConfig) -> CmdResult {
    let (_store, list) = open_list(loaded)?;
    let records: Vec<&Record> = list.iter().map(|id| &list[id].record).collect();
    let mut header = list.keys().to_vec();
    for record in &records {
        for key in record.keys() {
            if !header.iter().any(|h| h == key) {
                header.push(key.to_string());
            }
        }
    }
    print!("{}", format_table(&header, records));
    Ok(())
}

fn cmd_recovery(loaded: &LoadedConfig, args: RecoveryArgs, json: bool) -> CmdResult {
    let entries = read_recovery_entries(&loaded.state_dir, args.limit);
    if json {
        let out: Vec<RecoveryEntryJson> = entries.iter().map(recovery_to_json).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("recovery log is empty");
        return Ok(());
    }
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            println!();
        }
        for line in format_recovery_entry(entry) {
            println!("{}", line);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

fn cmd_add(loaded: &LoadedConfig, args: AddArgs) -> CmdResult {
    let (mut store, mut list) = open_list(loaded)?;
    let assignments = parse_assignments(&args.set)?;

    let (parent_id, parent_category) = match &args.parent {
        Some(parent) => {
            let node = &list[find_task(&list, parent)?];
            (node.id().to_string(), Some(node.category().to_string()))
        }
        None => (String::new(), None),
    };
    let category = args
        .category
        .or(parent_category)
        .ok_or("a category is required for top-level tasks (use --category)")?;

    let id = list.next_id().to_string();
    let mut record = Record::new()
        .with("id", &id)
        .with("parent_id", &parent_id)
        .with("category", &category)
        .with("name", &args.name)
        .with("status", STATUS_OPEN);
    for key in list.keys().to_vec() {
        if !record.contains(&key) {
            record.set(&key, "");
        }
    }
    for (key, value) in &assignments {
        record.set(key, value);
    }

    list.upsert(record)?;
    store.save(&mut list)?;
    println!("{}", id);
    Ok(())
}

fn cmd_edit(loaded: &LoadedConfig, args: IdArgs) -> CmdResult {
    let (mut store, mut list) = open_list(loaded)?;
    let record = list[find_task(&list, &args.id)?].record.clone();
    let editor = resolve_editor(loaded.config.ui.editor.as_deref());
    match edit_record(&record, &editor)? {
        EditOutcome::Unmodified => println!("no changes"),
        EditOutcome::Modified(edited) => {
            list.upsert(edited)?;
            store.save(&mut list)?;
            println!("updated {}", args.id);
        }
    }
    Ok(())
}

fn cmd_done(loaded: &LoadedConfig, args: IdArgs) -> CmdResult {
    let (mut store, mut list) = open_list(loaded)?;
    let node = find_task(&list, &args.id)?;
    let count = list.mark_complete(node)?;
    store.save(&mut list)?;
    println!("completed {} task(s)", count);
    Ok(())
}

fn cmd_rm(loaded: &LoadedConfig, args: IdArgs) -> CmdResult {
    let (mut store, mut list) = open_list(loaded)?;
    let node = find_task(&list, &args.id)?;
    list.mark_delete(node)?;
    let summary = store.save(&mut list)?;
    println!("deleted {} task(s)", summary.purged);
    Ok(())
}

fn cmd_mv(loaded: &LoadedConfig, args: MvArgs) -> CmdResult {
    if args.parent.is_none() && !args.root && args.category.is_none() {
        return Err("nothing to do: give --parent, --root or --category".into());
    }
    let (mut store, mut list) = open_list(loaded)?;
    let mut record = list[find_task(&list, &args.id)?].record.clone();

    if let Some(parent) = &args.parent {
        let node = &list[find_task(&list, parent)?];
        record.set("parent_id", node.id());
        if args.category.is_none() {
            record.set("category", node.category());
        }
    } else if args.root {
        record.set("parent_id", "");
    }
    if let Some(category) = &args.category {
        record.set("category", category);
        // A category change alone takes the task out from under its parent
        if args.parent.is_none() {
            record.set("parent_id", "");
        }
    }

    list.upsert(record)?;
    store.save(&mut list)?;
    println!("moved {}", args.id);
    Ok(())
}

fn cmd_import(loaded: &LoadedConfig, args: ImportArgs, json: bool) -> CmdResult {
    let text = if args.file == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&args.file)
            .map_err(|e| format!("could not read {}: {}", args.file, e))?
    };
    let table = parse_table(&text)?;

    let (mut store, mut list) = open_list(loaded)?;
    let report = list.import(table.records);
    store.save(&mut list)?;

    if json {
        let out = ImportJson {
            imported: report.loaded,
            skipped: report
                .skipped
                .iter()
                .map(|(record, err)| SkippedJson {
                    id: record.value("id").to_string(),
                    reason: err.to_string(),
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for (record, err) in &report.skipped {
            eprintln!("skipped {}: {}", record.value("id"), err);
        }
        println!(
            "imported {} task(s), skipped {}",
            report.loaded,
            report.skipped.len()
        );
    }
    Ok(())
}
