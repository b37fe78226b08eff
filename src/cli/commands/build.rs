use crate::cli::output::*;
use crate::core::config::{default_config, load_config};
use crate::core::provider::ProviderRegistry;
use crate::taxonomy::{IssueKind, Source, Taxonomy};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Build configuration (TOML)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Provider definitions (JSON)
    #[arg(short = 'p', long, value_name = "FILE")]
    pub providers: PathBuf,

    /// Source export as provider=path; may be repeated
    #[arg(short = 's', long = "source", value_name = "PROVIDER=PATH", required = true)]
    pub sources: Vec<Source>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Do not show progress bars
    #[arg(long)]
    pub no_progress: bool,
}

pub fn run(args: BuildArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => default_config(),
    };
    if args.no_progress {
        config.performance.progress = false;
    }
    let providers = ProviderRegistry::load(&args.providers)?;
    info(&format!(
        "Building from {} sources with {} providers",
        args.sources.len(),
        providers.len()
    ));

    let mut taxonomy = Taxonomy::new(config, providers);
    taxonomy.load(&args.sources)?;
    taxonomy.resolve()?;
    let summary = taxonomy.create_output(&args.output)?;

    print_report(&taxonomy);
    success(&format!(
        "Wrote {} taxa, {} variants and {} identifiers to {}",
        format_number(summary.taxa),
        format_number(summary.variants),
        format_number(summary.identifiers),
        summary.directory.display()
    ));
    if summary.synonym_translations > 0 {
        info(&format!(
            "{} forbidden taxa emitted as synonyms",
            format_number(summary.synonym_translations)
        ));
    }
    Ok(())
}

fn print_report(taxonomy: &Taxonomy) {
    let report = taxonomy.report();
    section_header("Build Report");

    let mut table = create_standard_table();
    table.set_header(vec![header_cell("Counter"), header_cell("Value")]);
    for (name, value) in report.counts() {
        table.add_row(vec![name.to_string(), format_number(value)]);
    }
    println!("{}", table);

    let kinds = report.by_kind();
    if kinds.is_empty() {
        empty("No issues recorded");
        return;
    }
    let items: Vec<(&str, String)> = kinds
        .iter()
        .map(|(kind, count)| (kind.label(), format_number(*count)))
        .collect();
    tree(&items);
    if kinds
        .keys()
        .any(|k| matches!(k, IssueKind::Error | IssueKind::Problem))
    {
        warning("Problems were found; see issues.csv in the output directory");
    }
}
