//! Command-line interface definitions.
//!
//! ```sh
//! # Fresh crawl into audit_<timestamp>/
//! blog_audit crawl
//!
//! # Resume, skip the prompt, then archive 200 random articles
//! blog_audit crawl --resume audit_20240205_101500/checkpoint.json --yes --archive-sample 200
//!
//! # Rebuild report and charts offline
//! blog_audit report --checkpoint audit_20240205_101500/checkpoint.json
//!
//! # Archive a sample from an existing audit
//! blog_audit -c site.yaml archive --dir audit_20240205_101500 --sample 100
//! ```

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Output directory (defaults to audit_<timestamp>, or the checkpoint's directory when resuming)
    #[arg(short, long, global = true)]
    pub output_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Crawl the blog listing and write the audit bundle
    Crawl {
        /// Resume from an existing checkpoint.json
        #[arg(long)]
        resume: Option<String>,

        /// Start without asking for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Archive this many random articles once the crawl finishes
        #[arg(long)]
        archive_sample: Option<usize>,

        /// Pages to start before the estimated resume page
        #[arg(long)]
        safety_margin: Option<u32>,
    },
    /// Rebuild report, exports and charts from a checkpoint
    Report {
        #[arg(long)]
        checkpoint: String,
    },
    /// Submit a random sample of an audit's articles to the Wayback Machine
    Archive {
        /// Audit directory containing articles.csv
        #[arg(long)]
        dir: String,

        /// Number of articles to archive (defaults to the configured sample size)
        #[arg(long)]
        sample: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_defaults() {
        let cli = Cli::parse_from(["blog_audit", "crawl"]);
        assert_eq!(cli.config, None);
        assert_eq!(cli.output_dir, None);
        assert_eq!(
            cli.command,
            Command::Crawl {
                resume: None,
                yes: false,
                archive_sample: None,
                safety_margin: None,
            }
        );
    }

    #[test]
    fn test_crawl_resume_flags() {
        let cli = Cli::parse_from([
            "blog_audit",
            "crawl",
            "--resume",
            "audit/checkpoint.json",
            "-y",
            "--archive-sample",
            "200",
            "--safety-margin",
            "5",
        ]);
        assert_eq!(
            cli.command,
            Command::Crawl {
                resume: Some("audit/checkpoint.json".to_string()),
                yes: true,
                archive_sample: Some(200),
                safety_margin: Some(5),
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "blog_audit",
            "archive",
            "--dir",
            "audit_x",
            "-c",
            "site.yaml",
            "-o",
            "/tmp/out",
        ]);
        assert_eq!(cli.config.as_deref(), Some("site.yaml"));
        assert_eq!(cli.output_dir.as_deref(), Some("/tmp/out"));
        assert_eq!(
            cli.command,
            Command::Archive {
                dir: "audit_x".to_string(),
                sample: None,
            }
        );
    }

    #[test]
    fn test_report_requires_checkpoint() {
        assert!(Cli::try_parse_from(["blog_audit", "report"]).is_err());
    }
}
