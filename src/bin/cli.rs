use site_schedule::calendar::{format_date, parse_date};
use site_schedule::{
    EngineConfig, NewException, NewTask, Project, ProjectId, RelationType, ScheduleEngine,
    ScheduleError, SqliteScheduleStore, SystemClock, Task, TaskPatch, TaskUpdate, logging,
};
use std::io::{self, Write};
use std::sync::Arc;

type Engine = ScheduleEngine<SqliteScheduleStore>;

const COLUMNS: [&str; 9] = [
    "id",
    "name",
    "start_date",
    "end_date",
    "progress",
    "pred",
    "rel",
    "lag",
    "exception",
];

fn task_row(task: &Task) -> Vec<String> {
    vec![
        task.id.to_string(),
        task.name.clone(),
        format_date(task.start_date),
        format_date(task.end_date),
        task.progress.to_string(),
        task.predecessor_id.map(|id| id.to_string()).unwrap_or_default(),
        task.rel_type.to_string(),
        task.lag_days.to_string(),
        if task.is_exception { "yes".into() } else { String::new() },
    ]
}

fn render_row(widths: &[usize], cells: &[&str]) -> String {
    let mut line = String::from("|");
    for (ci, cell) in cells.iter().enumerate() {
        line.push(' ');
        line.push_str(cell);
        let pad = widths[ci].saturating_sub(cell.chars().count());
        line.push_str(&" ".repeat(pad));
        line.push_str(" |");
    }
    line
}

fn render_tasks_as_text_table(tasks: &[Task]) -> String {
    let rows: Vec<Vec<String>> = tasks.iter().map(task_row).collect();

    let mut widths: Vec<usize> = COLUMNS.iter().map(|n| n.len()).collect();
    for row in &rows {
        for (ci, cell) in row.iter().enumerate() {
            widths[ci] = widths[ci].max(cell.chars().count());
        }
    }

    let mut sep = String::from("+");
    for w in &widths {
        sep.push_str(&"-".repeat(*w + 2));
        sep.push('+');
    }

    let mut out = String::new();
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&render_row(&widths, &COLUMNS));
    out.push('\n');
    out.push_str(&sep);
    out.push('\n');
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push_str(&render_row(&widths, &cells));
        out.push('\n');
    }
    out.push_str(&sep);
    out.push('\n');
    out
}

fn print_help() {
    println!(
        "Commands:\n  help                               Show this help\n  project <id> [name...]             Select a project, registering it if new\n  tasks                              Show the schedule\n  add <name> <start> <end>           Create a task (dates YYYY-MM-DD)\n  link <id> <pred> [FS|SS] [lag]     Set a task's predecessor\n  unlink <id>                        Clear a task's predecessor\n  edit <id> <field> <value> <reason...>\n                                     Audited edit and cascade (field: name|start|end|progress|lag)\n  exception <task> <date> <days> <name> <description...>\n                                     Splice an exception after a task\n  hold                               Put the project on hold\n  release                            Release the hold\n  golive                             Mark the project live\n  delete <id>                        Delete one task\n  chain <id>                         Delete a task and its dependents\n  log                                Show the edit log\n  export json|csv <path>             Write the schedule to a file\n  quit|exit                          Exit"
    );
}

fn parse_id(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.parse().ok())
}

fn report(result: Result<String, ScheduleError>) {
    match result {
        Ok(message) => println!("{message}"),
        Err(err) => println!("Error: {err}"),
    }
}

fn show(engine: &Engine, project_id: ProjectId) -> Result<String, ScheduleError> {
    Ok(render_tasks_as_text_table(&engine.list_tasks(project_id)?))
}

fn edit_patch(field: &str, value: &str) -> Option<TaskPatch> {
    let mut patch = TaskPatch::default();
    match field {
        "name" => patch.name = Some(value.to_string()),
        "start" => patch.start_date = Some(parse_date(value)?),
        "end" => patch.end_date = Some(parse_date(value)?),
        "progress" => patch.progress = Some(value.parse().ok()?),
        "lag" => patch.lag_days = Some(value.parse().ok()?),
        _ => return None,
    }
    Some(patch)
}

fn run_command(engine: &Engine, project_id: ProjectId, cmd: &str, args: &[&str]) -> Result<String, ScheduleError> {
    match cmd {
        "tasks" => show(engine, project_id),
        "add" => {
            let (Some(name), Some(start), Some(end)) = (
                args.first(),
                args.get(1).and_then(|s| parse_date(s)),
                args.get(2).and_then(|s| parse_date(s)),
            ) else {
                return Ok("Usage: add <name> <YYYY-MM-DD> <YYYY-MM-DD>".into());
            };
            let task = engine.create_task(project_id, NewTask::new(*name).dated(start, end))?;
            Ok(format!("Created task {}.\n{}", task.id, show(engine, project_id)?))
        }
        "link" => {
            let (Some(id), Some(pred)) = (parse_id(args.first().copied()), parse_id(args.get(1).copied())) else {
                return Ok("Usage: link <id> <pred> [FS|SS] [lag]".into());
            };
            let rel_type = match args.get(2) {
                Some(rel) => match rel.parse::<RelationType>() {
                    Ok(rel) => rel,
                    Err(err) => return Ok(format!("Invalid relation: {err}")),
                },
                None => RelationType::FinishToStart,
            };
            let lag = args.get(3).and_then(|v| v.parse().ok()).unwrap_or(0);
            let update = TaskUpdate::from(TaskPatch {
                predecessor_id: Some(Some(pred)),
                rel_type: Some(rel_type),
                lag_days: Some(lag),
                ..TaskPatch::default()
            });
            engine.update_task(project_id, id, update)?;
            Ok(format!("Linked task {id} after {pred} ({rel_type}, lag {lag})."))
        }
        "unlink" => {
            let Some(id) = parse_id(args.first().copied()) else {
                return Ok("Usage: unlink <id>".into());
            };
            let update = TaskUpdate::from(TaskPatch {
                predecessor_id: Some(None),
                ..TaskPatch::default()
            });
            engine.update_task(project_id, id, update)?;
            Ok(format!("Unlinked task {id}."))
        }
        "edit" => {
            let (Some(id), Some(field), Some(value)) =
                (parse_id(args.first().copied()), args.get(1), args.get(2))
            else {
                return Ok("Usage: edit <id> <field> <value> <reason...>".into());
            };
            let Some(patch) = edit_patch(field, value) else {
                return Ok(format!("Invalid value '{value}' for field '{field}'"));
            };
            let reason = args.get(3..).map(|r| r.join(" ")).unwrap_or_default();
            let tasks = engine.reasoned_edit(project_id, id, &patch, &reason, "cli")?;
            Ok(format!("Edited task {id}.\n{}", render_tasks_as_text_table(&tasks)))
        }
        "exception" => {
            let (Some(target), Some(date), Some(days), Some(name)) = (
                parse_id(args.first().copied()),
                args.get(1).and_then(|s| parse_date(s)),
                args.get(2).and_then(|v| v.parse::<i64>().ok()),
                args.get(3),
            ) else {
                return Ok("Usage: exception <task> <YYYY-MM-DD> <days> <name> <description...>".into());
            };
            let description = args.get(4..).map(|r| r.join(" ")).unwrap_or_default();
            let request = NewException::new(*name, date, target, description)
                .lasting(days)
                .by("cli");
            let tasks = engine.add_exception(project_id, request)?;
            Ok(format!("Exception added.\n{}", render_tasks_as_text_table(&tasks)))
        }
        "hold" => {
            let project = engine.hold(project_id)?;
            Ok(format!(
                "Project {} on hold since {}.",
                project.id,
                format_date(project.hold_start_date())
            ))
        }
        "release" => {
            let released = engine.release(project_id, "cli")?;
            Ok(format!(
                "Hold released after {} workday(s).\n{}",
                released.hold_days,
                render_tasks_as_text_table(&released.tasks)
            ))
        }
        "golive" => {
            engine.set_go_live(project_id, true)?;
            Ok(format!("Project {project_id} is live."))
        }
        "delete" | "chain" => {
            let Some(id) = parse_id(args.first().copied()) else {
                return Ok(format!("Usage: {cmd} <id>"));
            };
            let report = if cmd == "delete" {
                engine.delete_task(project_id, id)?
            } else {
                engine.delete_chain(project_id, id)?
            };
            Ok(format!(
                "Deleted tasks {:?}; unlinked {:?}.",
                report.deleted, report.unlinked
            ))
        }
        "log" => {
            let entries = engine.edit_log(project_id)?;
            if entries.is_empty() {
                return Ok("Edit log is empty.".into());
            }
            Ok(entries
                .iter()
                .map(|e| {
                    format!(
                        "#{} {} [{}] {} -> {} ({})",
                        e.id, e.task_name, e.field, e.old_value, e.new_value, e.reason
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        "export" => {
            let (Some(format), Some(path)) = (args.first(), args.get(1)) else {
                return Ok("Usage: export json|csv <path>".into());
            };
            match *format {
                "json" => engine.export_json(project_id, path)?,
                "csv" => engine.export_csv(project_id, path)?,
                other => return Ok(format!("Unknown export format '{other}'")),
            }
            Ok(format!("Schedule exported to {path}."))
        }
        _ => Ok("Unknown command. Type 'help'.".into()),
    }
}

fn select_project(engine: &Engine, args: &[&str]) -> Result<(ProjectId, String), ScheduleError> {
    let Some(id) = parse_id(args.first().copied()) else {
        return Err(ScheduleError::validation("usage: project <id> [name...]"));
    };
    match engine.project(id) {
        Ok(project) => Ok((project.id, format!("Using project {} ({}).", project.id, project.name))),
        Err(err) if err.is_not_found() => {
            let name = args.get(1..).map(|r| r.join(" ")).unwrap_or_default();
            let project = engine.register_project(Project::new(id, name))?;
            Ok((project.id, format!("Registered project {} ({}).", project.id, project.name)))
        }
        Err(err) => Err(err),
    }
}

fn main() {
    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err}");
            std::process::exit(2);
        }
    };
    logging::init(&config.log_filter);

    let engine = match Engine::open(config, Arc::new(SystemClock)) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("Failed to open schedule store: {err}");
            std::process::exit(1);
        }
    };

    println!("Site Schedule (CLI) - type 'help' for commands\n");

    let mut current: Option<ProjectId> = None;
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or("");
        let args: Vec<&str> = parts.collect();

        match cmd {
            "help" => print_help(),
            "quit" | "exit" => break,
            "project" => match select_project(&engine, &args) {
                Ok((id, message)) => {
                    current = Some(id);
                    println!("{message}");
                }
                Err(err) => println!("Error: {err}"),
            },
            _ => match current {
                Some(project_id) => report(run_command(&engine, project_id, cmd, &args)),
                None => println!("No project selected. Use 'project <id> [name]' first."),
            },
        }
    }
}
