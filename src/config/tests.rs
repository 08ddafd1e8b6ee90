use super::*;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let original_config = Config {
            ollama: OllamaConfig {
                protocol: "https".to_string(),
                host: "test-host".to_string(),
                port: 8080,
                model: "test-model".to_string(),
                ..OllamaConfig::default()
            },
            memory: MemoryConfig {
                dedup_threshold: 0.9,
                ..MemoryConfig::default()
            },
            base_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let loaded_config = Config::load(temp_dir.path()).expect("should load config");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [ollama
            host = "localhost"
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_values_rejected_on_load() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        fs::write(
            temp_dir.path().join("config.toml"),
            "[chunking]\nmax_chunk_size = 100\noverlap_size = 100\n",
        )
        .expect("should write config");

        assert!(Config::load(temp_dir.path()).is_err());
    }

    #[test]
    fn unknown_backend_rejected() {
        let result: Result<Config, toml::de::Error> =
            toml::from_str("[embedder]\nbackend = \"openai\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn config_validation_edge_cases() {
        let config = Config {
            ollama: OllamaConfig {
                host: String::new(),
                port: 80,
                ..OllamaConfig::default()
            },
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.is_err()); // Empty host should be invalid
    }

    #[test]
    fn port_boundary_validation() {
        let mut config = OllamaConfig::default();

        assert!(config.set_port(1).is_ok());
        assert!(config.set_port(65535).is_ok());
        assert!(config.set_port(0).is_err());
    }

    #[test]
    fn ollama_url_generation_with_different_hosts() {
        let configs = vec![
            ("http", "localhost", 11434, "http://localhost:11434/"),
            ("http", "127.0.0.1", 8080, "http://127.0.0.1:8080/"),
            (
                "https",
                "secure.example.com",
                443,
                "https://secure.example.com/",
            ),
        ];

        for (protocol, host, port, expected_url) in configs {
            let config = OllamaConfig {
                protocol: protocol.to_string(),
                host: host.to_string(),
                port,
                ..OllamaConfig::default()
            };

            let url = config.ollama_url().expect("ollama_url is ok");
            assert_eq!(url.as_str(), expected_url);
        }
    }

    #[test]
    fn error_display_messages() {
        let errors = vec![
            ConfigError::InvalidProtocol("ftp".to_string()),
            ConfigError::InvalidPort(0),
            ConfigError::InvalidModel(String::new()),
            ConfigError::InvalidUrl("invalid-url".to_string()),
            ConfigError::OverlapTooLarge(600, 500),
            ConfigError::InvalidThreshold("dedup threshold", 2.0),
        ];

        for error in errors {
            let message = format!("{error}");
            assert!(message.len() > 10);
        }
    }
}
