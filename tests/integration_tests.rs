use anyhow::Result;
use clap::Parser;
use httpmock::prelude::*;
use media_pricing_etl::{
    CliConfig, EtlEngine, FileSource, LocalStorage, PricingPipeline, SourceAdapter, TomlConfig,
};
use std::io::Read;
use tempfile::TempDir;

const OBSERVATIONS_CSV: &str = "\
city,state,service,price
Austin,Texas,Photography,\"$200\"
Austin,Texas,Photography,$220
Austin,Texas,Drone Video,350
Dallas,Texas,Photography,$300
Dallas,Texas,Drone Video,USD 450.00
Houston,Texas,Photography,not listed
Boise,Idaho,Drone Video,$400
";

const MUNICIPALITIES_JSON: &str = r#"[
    {"city": "Austin", "state": "Texas"},
    {"city": "Dallas", "state": "Texas"},
    {"city": "El Paso", "state": "Texas"},
    {"city": "Boise", "state": "Idaho"}
]"#;

fn write_inputs(dir: &TempDir) -> Result<(String, String)> {
    let observations = dir.path().join("observations.csv");
    let municipalities = dir.path().join("municipalities.json");
    std::fs::write(&observations, OBSERVATIONS_CSV)?;
    std::fs::write(&municipalities, MUNICIPALITIES_JSON)?;
    Ok((
        observations.to_string_lossy().into_owned(),
        municipalities.to_string_lossy().into_owned(),
    ))
}

#[tokio::test]
async fn test_end_to_end_national_document() -> Result<()> {
    let input_dir = TempDir::new()?;
    let output_dir = TempDir::new()?;
    let (observations, municipalities) = write_inputs(&input_dir)?;
    let output_path = output_dir.path().to_string_lossy().into_owned();

    let config = CliConfig::parse_from([
        "media-pricing-etl",
        "--observations",
        observations.as_str(),
        "--municipalities",
        municipalities.as_str(),
        "--output-path",
        output_path.as_str(),
        "--services",
        "Photography,Drone Video",
        "--nearest-k",
        "2",
        "--seed",
        "11",
    ]);

    let source = FileSource::new(observations.clone(), Some(municipalities.clone()));
    let storage = LocalStorage::new(output_path.clone());
    let pipeline = PricingPipeline::new(storage, source, config);
    let engine = EtlEngine::new_with_monitoring(pipeline, false);

    let written = engine.run().await?;
    assert!(written.ends_with("US_REAL_ESTATE_PHOTOGRAPHY_VIDEOGRAPHY_COMPLETE.json"));

    let document: serde_json::Value = serde_json::from_slice(&std::fs::read(&written)?)?;
    let texas = &document["United States"]["Texas"];

    // 兩筆樣本取平均
    assert_eq!(
        texas["Austin"]["services"]["Photography"],
        serde_json::json!({"price": 210.0, "interpolation_used": false})
    );
    assert_eq!(
        texas["Dallas"]["services"]["Drone Video"]["price"],
        serde_json::json!(450.0)
    );

    // El Paso 只出現在清單中，兩個服務都由同州鄰居補值
    let el_paso = &texas["El Paso"]["services"];
    assert_eq!(el_paso["Photography"]["interpolation_used"], serde_json::json!(true));
    assert_eq!(el_paso["Drone Video"]["interpolation_used"], serde_json::json!(true));

    // Houston 的價格無法解析，該列被拒絕；城市本身不在清單中
    assert!(texas.get("Houston").is_none());

    // Boise 是愛達荷州唯一城市，照片價格改用全國樣本
    assert_eq!(
        document["United States"]["Idaho"]["Boise"]["services"]["Photography"]["interpolation_used"],
        serde_json::json!(true)
    );

    let manifest: serde_json::Value = serde_json::from_slice(&std::fs::read(
        output_dir.path().join("run_manifest.json"),
    )?)?;
    assert_eq!(manifest["stats"]["aggregation"]["rows_rejected"], serde_json::json!(1));
    assert_eq!(manifest["seed"], serde_json::json!(11));
    Ok(())
}

#[tokio::test]
async fn test_seeded_runs_write_identical_documents() -> Result<()> {
    let input_dir = TempDir::new()?;
    let (observations, municipalities) = write_inputs(&input_dir)?;

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let output_dir = TempDir::new()?;
        let output_path = output_dir.path().to_string_lossy().into_owned();
        let config = CliConfig::parse_from([
            "media-pricing-etl",
            "--observations",
            observations.as_str(),
            "--municipalities",
            municipalities.as_str(),
            "--output-path",
            output_path.as_str(),
            "--seed",
            "5",
        ]);
        let pipeline = PricingPipeline::new(
            LocalStorage::new(output_path.clone()),
            FileSource::new(observations.clone(), Some(municipalities.clone())),
            config,
        );
        let written = EtlEngine::new(pipeline).run().await?;
        outputs.push(std::fs::read(written)?);
    }

    assert_eq!(outputs[0], outputs[1]);
    Ok(())
}

#[tokio::test]
async fn test_toml_config_with_api_source_by_region() -> Result<()> {
    let server = MockServer::start();
    let observations_mock = server.mock(|when, then| {
        when.method(GET).path("/observations");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(serde_json::json!([
                {"city": "Portland", "state": "Oregon", "service": "Photography", "price": 180},
                {"city": "Salem", "state": "Oregon", "service": "Photography", "price": "$220"},
                {"city": "Salem", "state": "Oregon", "service": "Voiceover", "price": 90},
                {"city": "New York", "state": "New York", "service": "Voiceover", "price": null}
            ]));
    });

    let output_dir = TempDir::new()?;
    let toml_content = format!(
        r#"
[pipeline]
name = "api-pricing"
version = "1.0"

[source]
type = "api"
endpoint = "{}"

[pricing]
services = ["Photography", "Voiceover"]
nearest_k = 1
seed = 3

[load]
output_path = "{}"
split_by_region = true

[load.compression]
enabled = true
filename = "pricing_bundle.zip"
"#,
        server.url("/observations"),
        output_dir.path().to_string_lossy()
    );

    let config = TomlConfig::from_toml_str(&toml_content)?;
    media_pricing_etl::utils::validation::Validate::validate(&config)?;

    let source = SourceAdapter::from_config(&config.source)?;
    let storage = LocalStorage::new(config.load.output_path.clone());
    let pipeline = PricingPipeline::new(storage, source, config);
    EtlEngine::new(pipeline).run().await?;
    observations_mock.assert();

    let oregon_path = output_dir
        .path()
        .join("Oregon/US_Oregon_REAL_ESTATE_PHOTOGRAPHY_VIDEOGRAPHY.json");
    let oregon: serde_json::Value = serde_json::from_slice(&std::fs::read(oregon_path)?)?;
    assert_eq!(
        oregon["United States"]["Oregon"]["Portland"]["services"]["Voiceover"],
        serde_json::json!({"price": 99.0, "interpolation_used": true})
    );
    assert!(oregon["United States"].get("New York").is_none());

    let new_york_path = output_dir
        .path()
        .join("New_York/US_New_York_REAL_ESTATE_PHOTOGRAPHY_VIDEOGRAPHY.json");
    assert!(new_york_path.exists());

    let zip_data = std::fs::read(output_dir.path().join("pricing_bundle.zip"))?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data))?;
    assert_eq!(archive.len(), 2);

    let mut entry =
        archive.by_name("Oregon/US_Oregon_REAL_ESTATE_PHOTOGRAPHY_VIDEOGRAPHY.json")?;
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    assert!(content.contains("Portland"));
    Ok(())
}

#[tokio::test]
async fn test_missing_observation_file_is_critical() -> Result<()> {
    let output_dir = TempDir::new()?;
    let output_path = output_dir.path().to_string_lossy().into_owned();
    let config = CliConfig::parse_from([
        "media-pricing-etl",
        "--observations",
        "/nonexistent/observations.csv",
        "--output-path",
        output_path.as_str(),
    ]);

    let pipeline = PricingPipeline::new(
        LocalStorage::new(output_path.clone()),
        FileSource::new("/nonexistent/observations.csv", None::<String>),
        config,
    );
    let err = EtlEngine::new(pipeline).run().await.unwrap_err();

    assert_eq!(err.severity().exit_code(), 3);
    Ok(())
}
