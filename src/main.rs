use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::Result;
use std::path::PathBuf;
use todostore::{NewTodo, PRIORITY_DEFAULT, Store, Todo, TodoStatus, TodoUpdate, TransferFormat};

#[derive(Parser)]
#[command(name = "todo")]
#[command(about = "Todo list manager with tags, priorities, and JSON/CSV import/export")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "TODO_DB", default_value = "todos.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new todo
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, num_args = 0..)]
        tags: Option<Vec<String>>,
        /// Priority (1=highest, 5=lowest)
        #[arg(long, default_value_t = PRIORITY_DEFAULT, value_parser = priority_parser())]
        priority: u8,
    },

    /// List all todos
    List,

    /// List todos by status
    Status { status: TodoStatus },

    /// Search todos by title substring
    SearchTitle { substr: String },

    /// Search todos by tag
    SearchTag { tag: String },

    /// Update a todo
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        /// Remove the description
        #[arg(long)]
        clear_description: bool,
        /// New tags; pass the flag with no values to clear them
        #[arg(long, num_args = 0..)]
        tags: Option<Vec<String>>,
        #[arg(long)]
        status: Option<TodoStatus>,
        #[arg(long, value_parser = priority_parser())]
        priority: Option<u8>,
    },

    /// Export todos to a file
    Export { format: TransferFormat, filepath: PathBuf },

    /// Import todos from a file
    Import { format: TransferFormat, filepath: PathBuf },

    /// Create a new database and import todos from a file
    ImportNew { format: TransferFormat, filepath: PathBuf },

    /// List all tags
    ListTags,

    /// Rename a tag on every todo
    RenameTag { old_tag: String, new_tag: String },

    /// Delete a tag from all todos
    DeleteTag { tag: String },

    /// Bulk update status for todos
    BulkUpdateStatus {
        status: TodoStatus,
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Bulk delete todos
    BulkDelete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Bulk update priority for todos
    BulkUpdatePriority {
        #[arg(value_parser = priority_parser())]
        priority: u8,
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// List todos by priority
    Priority {
        #[arg(value_parser = priority_parser())]
        priority: u8,
    },

    /// List all todos sorted by priority (1=highest)
    ListSortedPriority,

    /// Delete a todo
    Delete { id: String },

    /// Initialize the database
    InitDb,
}

fn priority_parser() -> clap::builder::RangedI64ValueParser<u8> {
    clap::value_parser!(u8).range(i64::from(todostore::PRIORITY_MIN)..=i64::from(todostore::PRIORITY_MAX))
}

fn print_todo(todo: &Todo) {
    println!("{} {}", "ID:".bold(), todo.id);
    println!("{} {}", "Title:".bold(), todo.title);
    println!("{} {}", "Description:".bold(), todo.description.as_deref().unwrap_or("None"));
    println!("{} {:?}", "Tags:".bold(), todo.tags);
    println!("{} {}", "Status:".bold(), status_label(todo.status));
    println!("{} {}", "Priority:".bold(), todo.priority);
    println!("{} {}", "Created:".bold(), todo.created_at);
    println!("{} {}", "Updated:".bold(), todo.updated_at);
    println!();
}

fn status_label(status: TodoStatus) -> colored::ColoredString {
    match status {
        TodoStatus::Todo => status.as_str().yellow(),
        TodoStatus::InProgress => status.as_str().cyan(),
        TodoStatus::Done => status.as_str().green(),
    }
}

fn print_todos(todos: &[Todo]) {
    for todo in todos {
        print_todo(todo);
    }
}

fn not_found() {
    println!("{}", "Todo not found.".red());
}

fn main() -> Result<()> {
    // Logs go to stderr so they never mix with command output
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let store = Store::open(&cli.db)?;

    match cli.command {
        Commands::Add {
            title,
            description,
            tags,
            priority,
        } => {
            let todo = store.insert(NewTodo {
                title,
                description,
                tags: tags.unwrap_or_default(),
                priority,
            })?;
            println!("{}", "Added todo:".green());
            print_todo(&todo);
        }
        Commands::List => print_todos(&store.get_all()?),
        Commands::Status { status } => print_todos(&store.get_by_status(status)?),
        Commands::SearchTitle { substr } => print_todos(&store.search_by_title(&substr)?),
        Commands::SearchTag { tag } => print_todos(&store.search_by_tag(&tag)?),
        Commands::Update {
            id,
            title,
            description,
            clear_description,
            tags,
            status,
            priority,
        } => {
            let update = TodoUpdate {
                title,
                description: if clear_description { Some(None) } else { description.map(Some) },
                tags,
                status,
                priority,
            };
            match store.update(&id, update)? {
                Some(todo) => {
                    println!("{}", "Updated todo:".green());
                    print_todo(&todo);
                }
                None => not_found(),
            }
        }
        Commands::Export { format, filepath } => {
            store.export(format, &filepath)?;
            println!("Exported todos to {}.", filepath.display());
        }
        Commands::Import { format, filepath } => {
            let summary = store.import(format, &filepath)?;
            println!(
                "Imported {} todos from {} ({} skipped).",
                summary.imported,
                filepath.display(),
                summary.skipped
            );
        }
        Commands::ImportNew { format, filepath } => {
            let summary = store.import_new(format, &filepath)?;
            println!(
                "Created new DB and imported {} todos from {}.",
                summary.imported,
                filepath.display()
            );
        }
        Commands::ListTags => {
            let tags = store.list_tags()?;
            println!("{} {}", "Tags:".bold(), tags.join(", "));
        }
        Commands::RenameTag { old_tag, new_tag } => {
            let count = store.rename_tag(&old_tag, &new_tag)?;
            println!("Renamed tag in {} todos.", count);
        }
        Commands::DeleteTag { tag } => {
            let count = store.delete_tag_from_all(&tag)?;
            println!("Deleted tag from {} todos.", count);
        }
        Commands::BulkUpdateStatus { status, ids } => {
            let count = store.bulk_update_status(&ids, status)?;
            println!("Updated status for {} todos.", count);
        }
        Commands::BulkDelete { ids } => {
            let count = store.bulk_delete(&ids)?;
            println!("Deleted {} todos.", count);
        }
        Commands::BulkUpdatePriority { priority, ids } => {
            let count = store.bulk_update_priority(&ids, priority)?;
            println!("Updated priority for {} todos.", count);
        }
        Commands::Priority { priority } => print_todos(&store.get_by_priority(priority)?),
        Commands::ListSortedPriority => print_todos(&store.get_all_sorted_by_priority()?),
        Commands::Delete { id } => {
            if store.delete(&id)? {
                println!("{}", "Todo deleted.".green());
            } else {
                not_found();
            }
        }
        Commands::InitDb => {
            store.init()?;
            println!("Database initialized.");
        }
    }

    Ok(())
}
