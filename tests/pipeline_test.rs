use std::path::Path;

use law_matcher::config::ProviderConfig;
use law_matcher::models::RunStatus;
use law_matcher::{App, Config};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_test::assert_ok;

fn write_fixtures(dir: &Path, questions: usize) {
    let articles = json!([
        {"law_code": "CPLA", "law_name": "民法", "category": "民事", "article_no_main": 184,
         "content": "因故意或过失，不法侵害他人之权利者，负损害赔偿责任。"},
        {"law_code": "CPLA", "law_name": "民法", "category": "民事", "article_no_main": 185,
         "content": "数人共同不法侵害他人之权利者，连带负损害赔偿责任。"},
        {"law_code": "CPLA", "law_name": "民法", "category": "民事", "article_no_main": 767,
         "content": "所有人对于无权占有或侵夺其所有物者，得请求返还之。"},
        {"law_code": "CPLA", "law_name": "民法", "category": "民事", "article_no_main": 153,
         "content": "当事人互相表示意思一致者，无论其为明示或默示，契约即为成立。"},
        {"law_code": "CCPA", "law_name": "刑法", "category": "刑事", "article_no_main": 320,
         "content": "意图为自己或第三人不法之所有，而窃取他人之动产者，为窃盗罪。"},
        {"law_code": "CCPA", "law_name": "刑法", "category": "刑事", "article_no_main": 320, "article_no_sub": 1,
         "content": "意图为自己或第三人不法之利益，而窃占他人之不动产者，依前项之规定处断。"}
    ]);
    let stems = [
        "甲过失侵害乙之权利，乙得否请求损害赔偿？",
        "甲乙共同侵害丙之权利，应如何负责？",
        "丁无权占有戊之房屋，戊得请求返还吗？",
        "双方意思表示一致时契约是否成立？",
        "窃取他人动产成立何罪？",
    ];
    let questions: Vec<_> = (0..questions)
        .map(|i| {
            let (question_type, options) = if i % 2 == 0 {
                ("multiple_choice", vec!["成立", "不成立"])
            } else {
                ("essay", Vec::new())
            };
            json!({
                "question_id": format!("Q-{:03}", i + 1),
                "content": stems[i % stems.len()],
                "question_type": question_type,
                "options": options,
            })
        })
        .collect();

    std::fs::write(dir.join("articles.json"), articles.to_string()).unwrap();
    std::fs::write(dir.join("questions.json"), json!(questions).to_string()).unwrap();
}

fn config(dir: &Path, cost_per_call: f64, cost_ceiling: f64) -> Config {
    let mut simulator = ProviderConfig::simulation("simulator");
    simulator.simulated_latency_ms = 0;
    simulator.cost_per_call = cost_per_call;

    let mut config = Config::default();
    config.providers = vec![simulator];
    config.batch.cost_ceiling = cost_ceiling;
    config.batch.initial_batch_size = 4;
    config.articles_path = dir.join("articles.json").display().to_string();
    config.questions_path = dir.join("questions.json").display().to_string();
    config.output_dir = dir.join("out").display().to_string();
    config.output_log_file = dir.join("output.txt").display().to_string();
    config
}

#[tokio::test]
async fn test_simulated_runs_are_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), 10);
    let config = config(dir.path(), 0.0, 10.0);

    let first = App::initialize(config.clone()).await.unwrap().run().await.unwrap();
    let first_results = std::fs::read_to_string(dir.path().join("out/results.json")).unwrap();
    let second = App::initialize(config).await.unwrap().run().await.unwrap();
    let second_results = std::fs::read_to_string(dir.path().join("out/results.json")).unwrap();

    assert_eq!(first.total_questions, 10);
    assert_eq!(first.successful, 10);
    assert!(!first.halted);
    assert_eq!(
        serde_json::to_string(&first.most_referenced_articles).unwrap(),
        serde_json::to_string(&second.most_referenced_articles).unwrap()
    );
    assert_eq!(first.confidence_distribution, second.confidence_distribution);

    let sum: usize = first.confidence_distribution.iter().map(|b| b.count).sum();
    assert_eq!(sum, first.successful);

    // 结果里的处理耗时不同，只比较匹配内容
    let strip = |raw: &str| -> Vec<(String, Vec<String>)> {
        let value: serde_json::Value = serde_json::from_str(raw).unwrap();
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|o| {
                let result = &o["result"];
                let articles = result["matched_articles"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|a| a.as_str().unwrap().to_string())
                    .collect();
                (o["question_id"].as_str().unwrap().to_string(), articles)
            })
            .collect()
    };
    assert_eq!(strip(&first_results), strip(&second_results));
}

#[tokio::test]
async fn test_cost_ceiling_keeps_completed_work() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), 10);
    let config = config(dir.path(), 1.0, 6.0);

    let report = App::initialize(config).await.unwrap().run().await.unwrap();
    assert!(report.halted);
    assert_eq!(report.total_questions, 6);
    assert_eq!(report.successful + report.failed, 6);

    let raw = std::fs::read_to_string(dir.path().join("out/report.json")).unwrap();
    assert!(raw.contains("\"halted\": true"));
}

#[tokio::test]
async fn test_interrupted_run_resumes_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), 10);
    let checkpoint = dir.path().join("checkpoint.json");

    let mut first = config(dir.path(), 1.0, 3.0);
    first.batch.checkpoint_path = Some(checkpoint.display().to_string());
    let halted = App::initialize(first).await.unwrap().run().await.unwrap();
    assert!(halted.halted);
    assert_eq!(halted.total_questions, 3);
    assert!(checkpoint.exists());

    let saved: law_matcher::BatchRun =
        serde_json::from_str(&std::fs::read_to_string(&checkpoint).unwrap()).unwrap();
    assert_eq!(saved.status, RunStatus::Halted);
    assert_eq!(saved.cursor, 3);

    let mut second = config(dir.path(), 1.0, 100.0);
    second.batch.checkpoint_path = Some(checkpoint.display().to_string());
    let resumed = App::initialize(second).await.unwrap().run().await.unwrap();
    assert!(!resumed.halted);
    assert_eq!(resumed.total_questions, 10);
    assert!(!checkpoint.exists());
}

#[tokio::test]
async fn test_cancelled_run_is_reported_as_interrupted() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), 10);
    let mut config = config(dir.path(), 0.0, 10.0);
    config.providers[0].simulated_latency_ms = 100;
    config.batch.initial_concurrency = 1;
    config.batch.initial_batch_size = 2;

    let app = App::initialize(config).await.unwrap();
    let cancel = app.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        cancel.cancel();
    });

    let report = app.run().await.unwrap();
    assert!(report.halted);
    assert_eq!(report.run_status, Some(RunStatus::Cancelled));
    assert_eq!(report.input_questions, 10);
    assert!(report.total_questions < 10);
    assert_eq!(report.failed, 0);

    let raw = std::fs::read_to_string(dir.path().join("out/report.json")).unwrap();
    assert!(raw.contains("\"run_status\": \"cancelled\""));
}

#[tokio::test]
async fn test_blank_question_counts_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), 2);
    std::fs::write(
        dir.path().join("questions.json"),
        json!([
            {"question_id": "Q-1", "content": "   ", "question_type": "essay"},
            {"question_id": "Q-2", "content": "窃取他人动产成立何罪？", "question_type": "essay"}
        ])
        .to_string(),
    )
    .unwrap();

    let report = assert_ok!(App::initialize(config(dir.path(), 0.0, 10.0)).await.unwrap().run().await);
    assert_eq!(report.total_questions, 2);
    assert_eq!(report.successful, 1);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_missing_articles_file_fails_initialization() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 0.0, 10.0);
    assert!(App::initialize(config).await.is_err());
}
