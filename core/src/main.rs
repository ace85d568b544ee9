use taskframe::completion::CompletionModel;
use taskframe::extractor::TaskExtractor;
use taskframe::providers::completions::Ollama;
use tracing_subscriber::EnvFilter;

const TEXT: &str = r"
    Luis: Hey, have you had a chance to look at the report draft?

    Alex: Not yet, I've been swamped. Is it urgent?

    Luis: Yeah, I really need to finish writing it by Friday. It's the top priority this week.

    Alex: Got it. Do you want me to help with anything?

    Luis: Maybe later. First, I need to call Alice about the project updates, nothing too urgent, but it should get done soon.

    Alex: Okay, I can remind you about that. Anything else on your plate?

    Luis: Hmm, probably need to buy groceries at some point, but that's not pressing.

    Alex: Alright, so Friday for the report, call Alice soon, and groceries whenever. Makes sense.

    Luis: Exactly. Thanks for keeping me on track!
    ";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = Ollama::new(None)
        .build_client("You are a helpful assistant that extracts structured data from text.");
    let mut extractor = TaskExtractor::new(client);

    println!("Extracting tasks from text...");
    let tasks = extractor.extract(TEXT).await;

    if tasks.is_empty() {
        println!("No tasks could be extracted.");
        return;
    }

    println!("\nFound {} tasks:", tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        println!("\nTask {}:", i + 1);
        println!("  Title: {}", task.title);
        if let Some(description) = &task.description {
            println!("  Description: {description}");
        }
        println!("  Priority: {}", task.priority);
        if let Some(due_date) = &task.due_date {
            println!("  Due Date: {due_date}");
        }
    }
}
