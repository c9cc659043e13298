//! Flags used by redo and its helper commands.

use crate::version;

/// The flags determining a build.
#[derive(Debug, Clone)]
pub struct Flags {
    /// Targets named on the command line.
    pub targets: Vec<String>,
    /// Extra single-letter options for the shell running each `.do`.
    pub shell_args: String,
    /// Engine tracing level.
    pub verbosity: u64,
    /// Purge stale lock files instead of building.
    pub clean_locks: bool,
    /// Number of simultaneous jobs; reserved.
    pub jobs: usize,
}

/// Parse command line arguments for `redo`.
pub fn redo_args() -> Flags {
    let m = clap::App::new("redo")
        .version(version::VERSION)
        .about("build targets from their .do scripts")
        .arg(
            clap::Arg::with_name("jobs")
                .short("j")
                .long("jobs")
                .takes_value(true)
                .value_name("JOBS")
                .default_value("0")
                .hide_default_value(true)
                .help("the number of jobs to run simultaneously (reserved)"),
        )
        .arg(
            clap::Arg::with_name("xtrace")
                .short("x")
                .help("pass -x to the shell running each .do"),
        )
        .arg(
            clap::Arg::with_name("shellverbose")
                .short("v")
                .help("pass -v to the shell running each .do"),
        )
        .arg(
            clap::Arg::with_name("verbose")
                .long("verbose")
                .multiple(true)
                .help("show verbose output"),
        )
        .arg(
            clap::Arg::with_name("clean-locks")
                .long("clean-locks")
                .help("remove stale lock files and exit"),
        )
        .arg(
            clap::Arg::with_name("targets")
                .multiple(true)
                .value_name("TARGET")
                .help("the targets to build"),
        )
        .get_matches();
    flags_from(&m)
}

/// Parse command line arguments for `redo-ifchange`.
pub fn ifchange_args() -> Flags {
    let m = clap::App::new("redo-ifchange")
        .version(version::VERSION)
        .about("build targets that are out of date, and depend on them")
        .arg(
            clap::Arg::with_name("xtrace")
                .short("x")
                .help("pass -x to the shell running each .do"),
        )
        .arg(
            clap::Arg::with_name("shellverbose")
                .short("v")
                .help("pass -v to the shell running each .do"),
        )
        .arg(
            clap::Arg::with_name("verbose")
                .long("verbose")
                .multiple(true)
                .help("show verbose output"),
        )
        .arg(
            clap::Arg::with_name("targets")
                .multiple(true)
                .value_name("TARGET")
                .help("the targets to depend on"),
        )
        .get_matches();
    flags_from(&m)
}

/// Parse command line arguments for `redo-ifcreate`.
pub fn ifcreate_args() -> Vec<String> {
    let m = clap::App::new("redo-ifcreate")
        .version(version::VERSION)
        .about("depend on the creation of the named paths")
        .arg(
            clap::Arg::with_name("targets")
                .multiple(true)
                .required(true)
                .value_name("TARGET")
                .help("paths that must not exist yet"),
        )
        .get_matches();
    match m.values_of("targets") {
        Some(ts) => ts.map(String::from).collect(),
        None => Vec::new(),
    }
}

/// Parse command line arguments for `redo-always`.
pub fn always_args() {
    clap::App::new("redo-always")
        .version(version::VERSION)
        .about("mark the current target to be rebuilt on every run")
        .get_matches();
}

fn flags_from(m: &clap::ArgMatches) -> Flags {
    let mut shell_args = String::new();
    if m.is_present("xtrace") {
        shell_args.push('x');
    }
    if m.is_present("shellverbose") {
        shell_args.push('v');
    }
    let targets = match m.values_of("targets") {
        Some(ts) => ts.map(String::from).collect(),
        None => vec![String::from("all")],
    };
    Flags {
        targets: targets,
        shell_args: shell_args,
        verbosity: m.occurrences_of("verbose"),
        clean_locks: m.is_present("clean-locks"),
        jobs: if m.is_present("jobs") {
            value_t_or_exit!(m, "jobs", usize)
        } else {
            0
        },
    }
}
