use std::io::Write;
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::cli::args::CliArgs;
use crate::cli::command::{self, Command};
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::controller::{self, Applied, Completion, FetchRequest, InputController};
use crate::output::{self, OutputFormat};
use crate::pagination::{LastPage, PageState, DEFAULT_PAGE_SIZE};
use crate::source::{RemoteRecordSource, SourceOptions, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};

fn print_banner() {
    const BANNER: &str = r#"
                     __
    ____  ____  _____/ /_____  ____ _____ ____  _____
   / __ \/ __ \/ ___/ __/ __ \/ __ `/ __ `/ _ \/ ___/
  / /_/ / /_/ (__  ) /_/ /_/ / /_/ / /_/ /  __/ /
 / .___/\____/____/\__/ .___/\__,_/\__, /\___/_/
/_/                  /_/          /____/
    "#;
    eprintln!("{}", BANNER);
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[derive(Clone, Debug)]
struct RunConfig {
    source: SourceOptions,
    page_size: u64,
    output_format: OutputFormat,
    color: bool,
    no_color: bool,
    workers: usize,
    verbose: u8,
    once: bool,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let no_color = if args.color {
        false
    } else {
        args.no_color || cfg.no_color.unwrap_or(false)
    };
    let verbose = if args.verbose > 0 {
        args.verbose
    } else {
        cfg.verbose.unwrap_or(0)
    };

    let base_url = args
        .url
        .or(cfg.base_url)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    crate::source::parse_base_url(&base_url)
        .map_err(|e| format!("invalid base URL '{base_url}': {e}"))?;

    let page_size = args
        .page_size
        .or(cfg.page_size)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    validation::validate_page_size(page_size)?;

    let workers = args.workers.or(cfg.workers).unwrap_or(2);
    validation::validate_workers(workers)?;

    let output_format = match args.output_format.or(cfg.output_format) {
        Some(raw) => validation::validate_output_format(&raw)?,
        None => OutputFormat::Text,
    };

    let timeout = match args.timeout.or(cfg.timeout) {
        Some(0) | None => None,
        Some(secs) => Some(Duration::from_secs(secs)),
    };

    let header = args.header.or(cfg.header).filter(|h| !h.trim().is_empty());
    if let Some(raw) = header.as_deref() {
        crate::source::parse_header(raw).map_err(|e| format!("invalid header: {e}"))?;
    }

    Ok(RunConfig {
        source: SourceOptions {
            base_url,
            timeout,
            proxy: args.proxy.or(cfg.proxy).filter(|p| !p.trim().is_empty()),
            header,
            user_agent: args
                .user_agent
                .or(cfg.user_agent)
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        },
        page_size,
        output_format,
        color: args.color,
        no_color,
        workers,
        verbose,
        once: args.once,
    })
}

fn print_summary(run: &RunConfig) {
    eprintln!("{}", output::format_kv_line("URL", &run.source.base_url));
    eprintln!(
        "{}",
        output::format_kv_line("Page size", &run.page_size.to_string())
    );
    eprintln!(
        "{}",
        output::format_kv_line(
            "Timeout",
            &run.source
                .timeout
                .map(|t| format!("{}s", t.as_secs()))
                .unwrap_or_else(|| "none".to_string())
        )
    );
    eprintln!(
        "{}",
        output::format_kv_line(
            "HTTP",
            &format!(
                "proxy={} header={}",
                run.source.proxy.as_deref().unwrap_or("none"),
                format_bool(run.source.header.is_some())
            )
        )
    );
    eprintln!(
        "{}",
        output::format_kv_line("Output", run.output_format.label())
    );
    eprintln!();
}

pub(crate) fn status_line(controller: &InputController) -> String {
    let page = controller.page();
    let last = match page.last_page_status() {
        LastPage::Unknown => "?".to_string(),
        _ => page.last_page().unwrap_or_default().to_string(),
    };
    let total = page
        .total_count()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "?".to_string());
    let search = if controller.search_text().is_empty() {
        "none".to_string()
    } else {
        format!("{:?}", controller.search_text())
    };
    format!(
        "page {} of {} ({} records, {} per page), search {}, {} hidden, {} shown",
        page.page(),
        last,
        total,
        page.page_size(),
        search,
        controller.tracker().len(),
        controller.list().len()
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

// one interactive run: owns the controller, the list sink and the fetches still in flight
struct Session<W> {
    source: RemoteRecordSource,
    controller: InputController,
    format: OutputFormat,
    out: W,
    tx: mpsc::Sender<Completion>,
    pending: usize,
}

impl<W: Write> Session<W> {
    fn dispatch(&mut self, request: Option<FetchRequest>) {
        if let Some(request) = request {
            self.pending += 1;
            controller::spawn_request(self.source.clone(), request, self.tx.clone());
        }
    }

    fn print_list(&mut self) {
        let written = self
            .controller
            .list()
            .print(self.format, &mut self.out)
            .and_then(|_| self.out.flush());
        if let Err(e) = written {
            output::error(format!("failed to write records: {e}"));
        }
    }

    fn handle(&mut self, cmd: Command) -> Flow {
        match cmd {
            Command::Next => {
                let request = self.controller.next();
                if request.is_none() {
                    output::warn("already on the last page");
                }
                self.dispatch(request);
            }
            Command::Prev => {
                let request = self.controller.prev();
                if request.is_none() {
                    output::warn("already on the first page");
                }
                self.dispatch(request);
            }
            Command::Search(text) => {
                let request = self.controller.search(&text);
                self.dispatch(Some(request));
            }
            Command::Reset => {
                let request = self.controller.reset();
                self.dispatch(Some(request));
            }
            Command::Delete(id) => match self.controller.delete(id) {
                Ok(removed) => {
                    output::info(format!("removed {} from the list", removed.element_id));
                    self.print_list();
                }
                Err(e) => output::warn(e.to_string()),
            },
            Command::List => self.print_list(),
            Command::Status => output::info(status_line(&self.controller)),
            Command::Help => eprintln!("{}", command::help_text()),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn complete(&mut self, completion: Completion) {
        self.pending = self.pending.saturating_sub(1);
        match self.controller.apply(completion) {
            Applied::Rendered => self.print_list(),
            Applied::Stale => {}
            Applied::Failed(e) => output::error(e.to_string()),
        }
    }
}

/// Loads the first page, then interleaves command lines from `input` with
/// finished fetches until `quit`, or until `input` ends and every fetch in
/// flight has been applied.
///
/// Rendered lists go to `out`; the controller and the sink are handed back
/// for inspection.
pub(crate) async fn run_session<R, W>(
    source: RemoteRecordSource,
    controller: InputController,
    format: OutputFormat,
    input: R,
    out: W,
) -> (InputController, W)
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let (tx, mut rx) = mpsc::channel::<Completion>(64);
    let mut session = Session {
        source,
        controller,
        format,
        out,
        tx,
        pending: 0,
    };

    let initial = session.controller.load();
    session.dispatch(Some(initial));

    let mut lines = input.lines();
    let mut input_open = true;
    loop {
        if !input_open && session.pending == 0 {
            break;
        }
        tokio::select! {
            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<Command>() {
                        Ok(cmd) => {
                            if session.handle(cmd) == Flow::Quit {
                                break;
                            }
                        }
                        Err(e) => output::warn(e.to_string()),
                    }
                }
                Ok(None) => {
                    output::debug(format!(
                        "input closed, waiting for {} request(s)",
                        session.pending
                    ));
                    input_open = false;
                }
                Err(e) => {
                    output::error(format!("failed to read command: {e}"));
                    input_open = false;
                }
            },
            Some(completion) = rx.recv(), if session.pending > 0 => {
                session.complete(completion);
            }
        }
    }

    (session.controller, session.out)
}

pub(crate) async fn run_once<W: Write>(
    source: &RemoteRecordSource,
    page_size: u64,
    format: OutputFormat,
    out: &mut W,
) -> Result<InputController, String> {
    let mut pager = InputController::new(PageState::new(page_size));
    let request = pager.load();
    let completion = controller::run_request(source, request).await;
    match pager.apply(completion) {
        Applied::Failed(e) => return Err(e.to_string()),
        Applied::Stale => return Err("response arrived for an outdated request".to_string()),
        Applied::Rendered => {}
    }
    pager
        .list()
        .print(format, &mut *out)
        .and_then(|_| out.flush())
        .map_err(|e| format!("failed to write records: {e}"))?;
    Ok(pager)
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    output::set_verbosity(run.verbose);
    if run.color {
        output::set_color(true);
    } else if run.no_color {
        output::set_color(false);
    }

    let source = RemoteRecordSource::new(&run.source).map_err(|e| e.to_string())?;

    if run.once {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let pager = run_once(&source, run.page_size, run.output_format, &mut out).await?;
        output::debug(status_line(&pager));
        return Ok(());
    }

    print_banner();
    print_summary(&run);
    output::info("type 'help' for commands");

    let (pager, _) = run_session(
        source,
        InputController::new(PageState::new(run.page_size)),
        run.output_format,
        BufReader::new(tokio::io::stdin()),
        std::io::stdout(),
    )
    .await;

    output::debug(status_line(&pager));
    Ok(())
}

// flags grouped by help heading, followed by the session commands
fn render_custom_help() -> String {
    let cmd = CliArgs::command();
    let mut out = String::new();

    out.push_str(cmd.get_name());
    if let Some(version) = cmd.get_version() {
        out.push(' ');
        out.push_str(version);
    }
    out.push('\n');
    if let Some(about) = cmd.get_long_about().or(cmd.get_about()) {
        out.push_str(&about.to_string());
        out.push('\n');
    }
    out.push_str(&format!("\nUsage: {} [OPTIONS]\n\n", cmd.get_name()));

    let mut sections: Vec<(String, Vec<&clap::Arg>)> = Vec::new();
    for arg in cmd.get_arguments().filter(|a| !a.is_hide_set()) {
        let heading = arg.get_help_heading().unwrap_or("Options");
        match sections.iter_mut().find(|(h, _)| h == heading) {
            Some((_, args)) => args.push(arg),
            None => sections.push((heading.to_string(), vec![arg])),
        }
    }

    for (heading, args) in sections {
        out.push_str(&format!("{heading}:\n"));
        for arg in args {
            let mut flags: Vec<String> = Vec::new();
            if let Some(short) = arg.get_short() {
                flags.push(format!("-{short}"));
            }
            if let Some(long) = arg.get_long() {
                flags.push(format!("--{long}"));
            }
            for alias in arg.get_visible_aliases().unwrap_or_default() {
                flags.push(format!("--{alias}"));
            }
            let mut line = flags.join(", ");
            if arg.get_action().takes_values() {
                let value_name = arg
                    .get_value_names()
                    .and_then(|names| names.first())
                    .map(|name| name.as_str())
                    .unwrap_or("VALUE");
                line.push_str(&format!(" <{value_name}>"));
            }
            out.push_str(&format!("  {line}\n"));
            if let Some(help) = arg.get_help() {
                out.push_str(&format!("          {}\n", help.to_string().trim()));
            }
        }
        out.push('\n');
    }

    out.push_str(command::help_text());
    out.push('\n');
    out
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp => {
                print!("{}", render_custom_help());
                return Ok(());
            }
            ErrorKind::DisplayVersion => {
                print!("{}", CliArgs::command().render_version());
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    if args.init_config {
        let path = match args.config.as_deref() {
            Some(p) => config::expand_tilde(p),
            None => config::default_config_path()
                .ok_or_else(|| "could not determine home directory".to_string())?,
        };
        if config::ensure_default_config_file(&path)? {
            output::info(format!("wrote default config to {}", path.display()));
        } else {
            output::warn(format!("config already exists at {}", path.display()));
        }
        return Ok(());
    }

    let user_config_path = args.config.clone().map(|p| config::expand_tilde(&p));
    let cfg = match user_config_path.as_ref() {
        Some(path) => config::load_config(path, false)?,
        None => ConfigFile::default(),
    };

    let run = build_run_config(args, cfg)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(run.workers)
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))?;
    Ok(())
}
