use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "camlink")]
#[command(version, about = "Link person tracks across cameras and record presence sessions")]
pub struct Cli {
    /// Newline-delimited JSON sighting batches; `-` reads stdin
    #[arg(value_name = "SOURCE", default_value = "-")]
    pub sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn no_arguments_reads_stdin() {
        let cli = Cli::try_parse_from(["camlink"]).unwrap();
        assert_eq!(cli.sources, vec!["-".to_string()]);
    }

    #[test]
    fn sources_are_kept_in_order() {
        let cli = Cli::try_parse_from(["camlink", "cam1.jsonl", "-", "cam2.jsonl"]).unwrap();
        assert_eq!(cli.sources, vec!["cam1.jsonl", "-", "cam2.jsonl"]);
    }

    #[test]
    fn help_is_not_mistaken_for_a_source() {
        let err = Cli::try_parse_from(["camlink", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
