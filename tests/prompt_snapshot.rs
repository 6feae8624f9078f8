use image_translator::LanguagePair;
use image_translator::providers::render_batch_prompt;

#[test]
fn batch_prompt_snapshot() {
    let texts = vec!["Hello".to_string(), "Opening hours: 9:00-17:00".to_string()];
    let prompt = render_batch_prompt(&texts, LanguagePair::default()).unwrap();
    insta::assert_snapshot!(prompt);
}
