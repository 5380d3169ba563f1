#[cfg(test)]
mod tests {
    use crate::agent::{
        DEFAULT_PROMPT, FakeGeneSetAgent, GeneSetAgent, NamingResult, OllamaGeneSetAgent,
        parse_agent_specs, parse_response,
    };
    use std::path::Path;
    use tempfile::TempDir;

    fn genes(list: &[&str]) -> Vec<String> {
        list.iter().map(|g| g.to_string()).collect()
    }

    #[test]
    fn test_parse_response() {
        let response = "Process: DNA replication licensing\nConfidence Score: 0.87\n\nThe proteins...";

        assert_eq!(
            parse_response(response),
            Some(NamingResult {
                name: "DNA replication licensing".to_string(),
                confidence_score: 0.87,
            })
        );
    }

    #[test]
    fn test_parse_response_markdown() {
        let response = "**Process:** Ribosome biogenesis\n**Confidence Score:** .75";

        let result = parse_response(response).unwrap();
        assert_eq!(result.name, "Ribosome biogenesis");
        assert_eq!(result.confidence_score, 0.75);
    }

    #[test]
    fn test_parse_response_missing_fields() {
        assert!(parse_response("Process: Something").is_none());
        assert!(parse_response("Confidence Score: 0.3").is_none());
        assert!(parse_response("no structure at all").is_none());
    }

    #[tokio::test]
    async fn test_fake_agent_is_deterministic() {
        let agent = FakeGeneSetAgent::new();
        let genes = genes(&["A", "B", "C"]);

        let first = agent.name_gene_set(&genes).await.unwrap().unwrap();
        let second = agent.name_gene_set(&genes).await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.name, "Fake process of 3 genes led by A");
        assert_eq!(agent.attribute_prefix(), "FAKE_");
        assert!(agent.name_gene_set(&[]).await.unwrap().is_none());
    }

    #[test]
    fn test_ollama_prompt_and_prefix() {
        let agent = OllamaGeneSetAgent::new(
            Path::new("/usr/local/bin/ollama"),
            "llama2:13b",
            Some("Name {GENE_SET} please".to_string()),
        );

        assert_eq!(agent.attribute_prefix(), "llama2_13b_");
        assert_eq!(agent.build_prompt(&genes(&["A", "B"])), "Name A, B please");

        let default_agent = OllamaGeneSetAgent::new(Path::new("ollama"), "mistral", None);
        assert!(default_agent.build_prompt(&genes(&["X"])).contains("X"));
        assert!(DEFAULT_PROMPT.contains("{GENE_SET}"));
    }

    #[test]
    fn test_parse_agent_specs() {
        let temp_dir = TempDir::new().unwrap();
        let prompt_file = temp_dir.path().join("prompt.txt");
        std::fs::write(&prompt_file, "From file {GENE_SET}").unwrap();

        let specs = vec![
            "FAKE".to_string(),
            "fake".to_string(),
            "llama2".to_string(),
            "FAKE,ignored prompt".to_string(),
            format!("mistral,{}", prompt_file.display()),
            "gemma,Name, with comma {GENE_SET}".to_string(),
        ];
        let agents = parse_agent_specs(Path::new("/usr/local/bin/ollama"), &specs).unwrap();

        let prefixes: Vec<String> = agents.iter().map(|a| a.attribute_prefix()).collect();
        assert_eq!(
            prefixes,
            vec!["FAKE_", "FAKE_", "llama2_", "FAKE_", "mistral_", "gemma_"]
        );
    }

    #[test]
    fn test_parse_agent_specs_invalid() {
        let specs = vec![",prompt only".to_string()];
        assert!(parse_agent_specs(Path::new("ollama"), &specs).is_err());
    }

    #[test]
    fn test_parse_agent_specs_empty() {
        let agents = parse_agent_specs(Path::new("ollama"), &[]).unwrap();
        assert!(agents.is_empty());
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake_ollama.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ollama_agent_runs_binary() {
        let temp_dir = TempDir::new().unwrap();
        let script = write_script(
            temp_dir.path(),
            r#"[ "$1" = "run" ] || exit 3
printf 'Process: Model %s\nConfidence Score: 0.9\n' "$2""#,
        );

        let agent = OllamaGeneSetAgent::new(&script, "llama2", None);
        let result = agent.name_gene_set(&genes(&["A", "B"])).await.unwrap();

        assert_eq!(
            result,
            Some(NamingResult {
                name: "Model llama2".to_string(),
                confidence_score: 0.9,
            })
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ollama_agent_failure_yields_none() {
        let temp_dir = TempDir::new().unwrap();
        let script = write_script(temp_dir.path(), "echo boom >&2; exit 1");

        let agent = OllamaGeneSetAgent::new(&script, "llama2", None);
        let result = agent.name_gene_set(&genes(&["A"])).await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_ollama_agent_missing_binary() {
        let agent = OllamaGeneSetAgent::new(Path::new("/nonexistent/ollama"), "llama2", None);
        assert!(agent.name_gene_set(&genes(&["A"])).await.is_err());
    }
}
