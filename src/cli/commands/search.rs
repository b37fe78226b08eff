use crate::bio::TaxonomicRank;
use crate::cli::output::*;
use crate::core::config::{default_config, load_config};
use crate::index::searcher::{MatchOutcome, MatchResult, PartialClassification, Searcher};
use crate::index::{MatchType, NameIndex};
use clap::Args;
use colored::*;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Exported backbone directory
    #[arg(short, long, value_name = "DIR")]
    pub index: PathBuf,

    /// Matching configuration (TOML, [matching] section)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Scientific name to search for
    #[arg(short, long)]
    pub name: Option<String>,

    #[arg(long)]
    pub rank: Option<String>,

    #[arg(long)]
    pub authorship: Option<String>,

    #[arg(long)]
    pub kingdom: Option<String>,

    #[arg(long)]
    pub phylum: Option<String>,

    #[arg(long)]
    pub class: Option<String>,

    #[arg(long)]
    pub order: Option<String>,

    #[arg(long)]
    pub family: Option<String>,

    #[arg(long)]
    pub genus: Option<String>,

    #[arg(long)]
    pub specific_epithet: Option<String>,

    #[arg(long)]
    pub infraspecific_epithet: Option<String>,

    /// Look up a taxon identifier instead of a name
    #[arg(long, conflicts_with_all = ["name", "batch"])]
    pub id: Option<String>,

    /// Match every row of a classification CSV
    #[arg(long, value_name = "CSV")]
    pub batch: Option<PathBuf>,

    /// Where batch results go (default: stdout)
    #[arg(short, long, value_name = "CSV", requires = "batch")]
    pub output: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    pub format: String,
}

impl SearchArgs {
    fn query(&self) -> anyhow::Result<PartialClassification> {
        let rank = match self.rank.as_deref() {
            Some(label) => Some(
                TaxonomicRank::parse(label)
                    .ok_or_else(|| anyhow::anyhow!("Unknown rank: {}", label))?,
            ),
            None => None,
        };
        Ok(PartialClassification {
            scientific_name: self.name.clone(),
            authorship: self.authorship.clone(),
            rank,
            kingdom: self.kingdom.clone(),
            phylum: self.phylum.clone(),
            class: self.class.clone(),
            order: self.order.clone(),
            family: self.family.clone(),
            genus: self.genus.clone(),
            specific_epithet: self.specific_epithet.clone(),
            infraspecific_epithet: self.infraspecific_epithet.clone(),
        })
    }
}

pub fn run(args: SearchArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => default_config(),
    };
    let index = NameIndex::load(&args.index)?;
    tracing::debug!("Index holds {} entries", index.len());
    let searcher = Searcher::new(index, config.matching);

    if let Some(batch) = &args.batch {
        return run_batch(&searcher, batch, args.output.as_deref());
    }

    let result = match &args.id {
        Some(id) => match searcher.search_by_id(id) {
            Some(candidate) => MatchResult::unique(candidate, MatchType::TaxonId),
            None => {
                warning(&format!("No taxon with identifier {}", id));
                return Ok(());
            }
        },
        None => {
            let query = args.query()?;
            if query == PartialClassification::default() {
                anyhow::bail!("Give a name, a classification, an --id or a --batch file");
            }
            searcher.search_by_classification(&query)
        }
    };

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_result(&result),
    }
    Ok(())
}

fn print_result(result: &MatchResult) {
    section_header("Match");
    let errors: Vec<&str> = result.errors.iter().map(|e| e.title()).collect();
    let mut items = vec![
        ("Outcome", result.outcome_label().to_string()),
        (
            "Match type",
            result
                .match_type
                .map(|t| t.title().to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
        ("Issues", errors.join(", ")),
    ];
    if let Some(name) = &result.cleaned_name {
        items.push(("Cleaned name", name.clone()));
    }
    tree(&items);

    match &result.outcome {
        MatchOutcome::NotFound => empty("No match"),
        MatchOutcome::Unique(candidate) => {
            let taxon = candidate.taxon();
            success(&format!(
                "{} {} [{}] {}",
                taxon.scientific_name.bold(),
                taxon.authorship.as_deref().unwrap_or(""),
                taxon.rank,
                taxon.taxon_id.dimmed()
            ));
            if candidate.accepted.is_some() {
                info(&format!(
                    "Matched synonym {} ({})",
                    candidate.entry.scientific_name, candidate.entry.taxon_id
                ));
            }
        }
        MatchOutcome::Ambiguous(candidates) => {
            warning("Ambiguous: several taxa share this name");
            let mut table = create_standard_table();
            table.set_header(vec![
                header_cell("Taxon"),
                header_cell("Name"),
                header_cell("Rank"),
                header_cell("Kingdom"),
                header_cell("Family"),
                header_cell("Match"),
                header_cell("Priority"),
            ]);
            for candidate in candidates {
                let taxon = candidate.taxon();
                table.add_row(vec![
                    taxon.taxon_id.clone(),
                    format!(
                        "{} {}",
                        taxon.scientific_name,
                        taxon.authorship.as_deref().unwrap_or("")
                    ),
                    taxon.rank.to_string(),
                    taxon.classification.kingdom.clone().unwrap_or_default(),
                    taxon.classification.family.clone().unwrap_or_default(),
                    format!("{:.3}", candidate.metrics.match_score),
                    candidate.metrics.priority.to_string(),
                ]);
            }
            println!("{}", table);
        }
    }
}

const BATCH_COLUMNS: [&str; 10] = [
    "scientificName",
    "outcome",
    "taxonID",
    "acceptedNameUsageID",
    "matchedName",
    "taxonRank",
    "matchType",
    "matchScore",
    "priority",
    "issues",
];

fn run_batch(searcher: &Searcher, input: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let mut reader = csv::Reader::from_path(input)?;
    let queries = reader
        .deserialize()
        .collect::<Result<Vec<PartialClassification>, _>>()?;
    tracing::info!("Matching {} queries from {}", queries.len(), input.display());

    let results = searcher.search_batch(&queries);

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = csv::Writer::from_writer(sink);
    writer.write_record(BATCH_COLUMNS)?;
    let mut found = 0;
    for (query, result) in queries.iter().zip(&results) {
        let best = result.best();
        let issues: Vec<&str> = result.errors.iter().map(|e| e.title()).collect();
        if result.is_found() {
            found += 1;
        }
        writer.write_record([
            query.scientific_name.clone().unwrap_or_default(),
            result.outcome_label().to_string(),
            best.map(|c| c.entry.taxon_id.clone()).unwrap_or_default(),
            best.and_then(|c| c.accepted.as_ref())
                .map(|a| a.taxon_id.clone())
                .unwrap_or_default(),
            best.map(|c| c.taxon().scientific_name.clone()).unwrap_or_default(),
            best.map(|c| c.taxon().rank.to_string()).unwrap_or_default(),
            result.match_type.map(|t| t.title().to_string()).unwrap_or_default(),
            best.map(|c| format!("{:.3}", c.metrics.match_score)).unwrap_or_default(),
            best.map(|c| c.metrics.priority.to_string()).unwrap_or_default(),
            issues.join("|"),
        ])?;
    }
    writer.flush()?;
    if output.is_some() {
        success(&format!(
            "Matched {} of {} queries",
            format_number(found),
            format_number(queries.len())
        ));
    }
    Ok(())
}
