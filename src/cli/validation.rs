use crate::cli::args::CliArgs;
use crate::output::OutputFormat;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(page_size) = args.page_size {
        validate_page_size(page_size)?;
    }
    if let Some(workers) = args.workers {
        validate_workers(workers)?;
    }
    if let Some(raw) = args.output_format.as_deref() {
        validate_output_format(raw)?;
    }
    if let Some(raw) = args.url.as_deref() {
        crate::source::parse_base_url(raw).map_err(|e| format!("invalid --url '{raw}': {e}"))?;
    }
    if let Some(raw) = args.header.as_deref() {
        crate::source::parse_header(raw).map_err(|e| format!("invalid --header: {e}"))?;
    }
    Ok(())
}

pub fn validate_page_size(page_size: u64) -> Result<(), String> {
    if page_size == 0 {
        return Err("invalid page-size, expected positive integer".to_string());
    }
    Ok(())
}

pub fn validate_workers(workers: usize) -> Result<(), String> {
    if workers == 0 {
        return Err("invalid workers, expected positive integer".to_string());
    }
    Ok(())
}

pub fn validate_output_format(raw: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(raw)
        .ok_or_else(|| format!("invalid output-format '{raw}', expected text or json"))
}
