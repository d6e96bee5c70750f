//! Loading prompt configuration from TOML.
//!
//! See `AgentConfig` and `Prompts` for the expected schema. Every prompt is
//! optional in the file; missing ones keep their default.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompts sent to the model. Templates use `{grade}`, `{subject}`, `{theme}`,
/// `{notes}`, `{formats}`, `{difficulty}`, `{count}`, `{problem_number}` and
/// `{current_question}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub system: String,
  pub generate_template: String,
  pub regenerate_template: String,
  pub suggest_title_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      system: "あなたは日本の学校教育に精通したベテラン教師です。指示されたJSON形式のみで回答してください。".into(),
      generate_template: r#"以下の条件で、ワークシート用の問題を生成してください。

対象学年：{grade}
教科：{subject}
テーマ・単元：{theme}
補足情報：{notes}
問題形式：{formats}
難易度：{difficulty}
問題数：{count}

出力形式：以下のJSON形式のみで返してください。余分なテキストやマークダウン記法は一切含めないでください。
{
  "title": "ワークシートのタイトル案",
  "problems": [
    {
      "number": 1,
      "type": "問題形式（一問一答/穴埋め問題/選択問題/○×クイズ/記述式（短答）/記述式（長文）/並べ替え問題/マッチング）",
      "question": "問題文",
      "choices": ["選択肢A", "選択肢B", "選択肢C", "選択肢D"],
      "answer": "正解",
      "explanation": "解説（教師用）"
    }
  ]
}

注意点：
- 学年に適した語彙と表現を使うこと
- 問題文は明確で誤解のないようにすること
- 難易度に応じて思考の深さを調整すること
- 選択問題の場合、紛らわしい選択肢を含めること（選択肢は必ず4つ）
- ○×クイズの場合、choicesは["○", "×"]とすること
- 一問一答・記述式・穴埋めの場合は choices を空配列 [] とすること
- 並べ替え問題の場合、choicesに並べ替え対象の要素を入れ、answerに正しい順序を記述すること
- マッチング問題の場合、choicesに対応させるペアを入れること
- 日本の学習指導要領に沿った内容であること
- 必ず{count}問生成すること"#.into(),
      regenerate_template: r#"以下の条件で、ワークシート用の問題を1問だけ新しく生成してください。

対象学年：{grade}
教科：{subject}
テーマ・単元：{theme}
補足情報：{notes}
問題形式：{formats}
難易度：{difficulty}

現在の問題「{current_question}」とは異なる、新しい問題を作ってください。

出力形式：以下のJSON形式のみで返してください。余分なテキストやマークダウン記法は一切含めないでください。
{
  "number": {problem_number},
  "type": "問題形式",
  "question": "問題文",
  "choices": ["選択肢A", "選択肢B", "選択肢C", "選択肢D"],
  "answer": "正解",
  "explanation": "解説（教師用）"
}

注意点：
- 学年に適した語彙と表現を使うこと
- 問題文は明確で誤解のないようにすること
- 選択問題の場合、選択肢は4つで紛らわしい選択肢を含めること
- ○×クイズの場合、choicesは["○", "×"]とすること
- 一問一答・記述式・穴埋めの場合は choices を空配列 [] とすること
- 日本の学習指導要領に沿った内容であること"#.into(),
      suggest_title_template: r#"以下の条件で、小中学生向けのワークシートのタイトルを3つ提案してください。

対象学年：{grade}
教科：{subject}
テーマ・単元：{theme}

出力形式：以下のJSON形式のみで返してください。余分なテキストやマークダウン記法は一切含めないでください。
{
  "titles": ["タイトル案1", "タイトル案2", "タイトル案3"]
}

タイトルは子どもが親しみやすく、学習意欲が湧くような表現にしてください。"#.into(),
    }
  }
}

/// Parse a TOML document into `AgentConfig`.
pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}

/// Attempt to load `AgentConfig` from WORKSHEET_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("WORKSHEET_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "worksheet_backend", %path, "Loaded prompt config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "worksheet_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "worksheet_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_prompt_table_keeps_other_defaults() {
    let cfg = parse_agent_config("[prompts]\nsystem = \"短く答えて\"\n").unwrap();
    assert_eq!(cfg.prompts.system, "短く答えて");
    assert_eq!(cfg.prompts.generate_template, Prompts::default().generate_template);
  }

  #[test]
  fn empty_document_is_all_defaults() {
    let cfg = parse_agent_config("").unwrap();
    assert!(cfg.prompts.suggest_title_template.contains("{theme}"));
  }

  #[test]
  fn malformed_document_is_an_error() {
    assert!(parse_agent_config("[prompts\nsystem = 1").is_err());
  }
}
