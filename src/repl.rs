//! Interactive command loop over stdin.
//!
//! A thin front end like the HTTP gateway: parse a line, call the
//! registry, print the outcome. Runs on a blocking thread so the async
//! runtime (gateway, deferred launches) keeps ticking underneath it.

use std::io::{BufRead, Write};
use std::sync::Arc;

use runnerd_supervisor::{LaunchMode, ProcessRegistry};

pub fn run(registry: Arc<ProcessRegistry>) {
    println!("runnerd console ready. Type 'help' for commands.");
    let stdin = std::io::stdin();

    loop {
        print!(">>> ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return, // stdin closed
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "console reader error");
                return;
            }
        }
        if !handle_command(&registry, line.trim()) {
            return;
        }
    }
}

/// Dispatch one command line. Returns false when the loop should exit.
fn handle_command(registry: &Arc<ProcessRegistry>, line: &str) -> bool {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, params)) = fields.split_first() else {
        return true;
    };

    match command {
        "help" => show_help(),
        "exit" | "quit" => return false,
        "list" => list_processes(registry),
        "add" => add_process(registry, params),
        "start" => start_process(registry, params),
        "stop" => stop_process(registry, params),
        "status" => show_status(registry, params),
        "remove" => remove_process(registry, params),
        "createrule" => create_rule(registry, params),
        "setjob" => assign_job(registry, params),
        "startjob" => start_job(registry, params),
        "deljob" => delete_job(registry, params),
        _ => println!("Unknown command. Use 'help' for a list of commands."),
    }
    true
}

fn add_process(registry: &Arc<ProcessRegistry>, params: &[&str]) {
    let &[name, path, mode] = params else {
        println!("Usage: add <name> <path> <mode (manual|scheduled)>");
        return;
    };
    let mode: LaunchMode = match mode.parse() {
        Ok(m) => m,
        Err(_) => {
            println!("Invalid mode, must be 'manual' or 'scheduled'.");
            return;
        }
    };
    match registry.add(name, path, mode) {
        Ok(_) => println!("Process '{name}' added successfully."),
        Err(e) => println!("Error: {e}"),
    }
}

fn start_process(registry: &Arc<ProcessRegistry>, params: &[&str]) {
    let Some((&name, args)) = params.split_first() else {
        println!("Usage: start <process_name> [args...]");
        return;
    };
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    match registry.start(name, &args) {
        Ok(pid) => println!("Process '{name}' started with PID {pid}."),
        Err(e) => println!("Error starting process: {e}"),
    }
}

fn stop_process(registry: &Arc<ProcessRegistry>, params: &[&str]) {
    let &[name] = params else {
        println!("Usage: stop <process_name>");
        return;
    };
    match registry.stop(name) {
        Ok(()) => println!("Process '{name}' stopped."),
        Err(e) => println!("Error stopping process: {e}"),
    }
}

fn list_processes(registry: &Arc<ProcessRegistry>) {
    let processes = registry.list();
    if processes.is_empty() {
        println!("No processes are being managed.");
        return;
    }
    println!("--- Managed Processes ---");
    for p in processes {
        println!(
            "Name: {:<15} | PID: {:<7} | Status: {:<17} | Mode: {}",
            p.name,
            p.pid.map_or("-".to_string(), |pid| pid.to_string()),
            p.status,
            p.mode,
        );
    }
}

fn show_status(registry: &Arc<ProcessRegistry>, params: &[&str]) {
    let &[name] = params else {
        println!("Usage: status <process_name>");
        return;
    };
    match registry.get(name) {
        Ok(p) => {
            println!("--- Status for '{name}' ---");
            println!("  Path: {}", p.path);
            println!("  Status: {}", p.status);
            println!("  Mode: {}", p.mode);
            if let Some(pid) = p.pid {
                println!("  PID: {pid}");
            }
            if let Some(at) = p.trigger_time {
                println!("  Scheduled Time: {}", at.to_rfc2822());
            }
        }
        Err(e) => println!("Error: {e}"),
    }
}

fn remove_process(registry: &Arc<ProcessRegistry>, params: &[&str]) {
    let &[name] = params else {
        println!("Usage: remove <process_name>");
        return;
    };
    match registry.remove(name) {
        Ok(()) => println!("Process '{name}' has been removed."),
        Err(e) => println!("Error removing process: {e}"),
    }
}

fn create_rule(registry: &Arc<ProcessRegistry>, params: &[&str]) {
    let &[name, time] = params else {
        println!("Usage: createrule <rule_name> <time (unix timestamp or RFC1123)>");
        return;
    };
    match registry.create_timing_rule(name, time) {
        Ok(rule) => println!(
            "Timing rule '{name}' created for {}.",
            rule.trigger_time.to_rfc2822()
        ),
        Err(e) => println!("Error: {e}"),
    }
}

fn assign_job(registry: &Arc<ProcessRegistry>, params: &[&str]) {
    let &[process, rule] = params else {
        println!("Usage: setjob <process_name> <rule_name>");
        return;
    };
    match registry.assign_job(process, rule) {
        Ok(()) => println!("Job set for process '{process}'."),
        Err(e) => println!("Error: {e}"),
    }
}

fn start_job(registry: &Arc<ProcessRegistry>, params: &[&str]) {
    let &[name] = params else {
        println!("Usage: startjob <process_name>");
        return;
    };
    match Arc::clone(registry).start_job(name) {
        Ok(()) => println!("Job for '{name}' is underway (or armed for its trigger time)."),
        Err(e) => println!("Error: {e}"),
    }
}

fn delete_job(registry: &Arc<ProcessRegistry>, params: &[&str]) {
    let &[name] = params else {
        println!("Usage: deljob <process_name>");
        return;
    };
    match registry.delete_job(name) {
        Ok(()) => println!("Job for '{name}' deleted."),
        Err(e) => println!("Error: {e}"),
    }
}

fn show_help() {
    println!("--- Runnerd Console ---");
    println!("  help                            - Show this help message");
    println!("  list                            - List all managed processes");
    println!("  add <name> <path> <mode>        - Add a process (manual|scheduled)");
    println!("  start <name> [args...]          - Start a manual process by name");
    println!("  stop <name>                     - Stop a running process by name");
    println!("  status <name>                   - Show detailed status of a process");
    println!("  remove <name>                   - Stop and remove a process");
    println!("--- Scheduling ---");
    println!("  createrule <rule> <time>        - Create a timing rule (unix timestamp or RFC1123)");
    println!("  setjob <proc> <rule>            - Assign a timing rule to a process");
    println!("  startjob <proc>                 - Start a scheduled process (arms a timer if needed)");
    println!("  deljob <proc>                   - Cancel and remove a scheduled process");
    println!("  exit                            - Leave the console and shut down");
}
