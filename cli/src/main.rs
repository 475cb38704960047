use clap::{Parser, Subcommand};
use academy::model::{CrudRepository, DatabaseError, DbConnection, ModelManager};
use academy::model::entity::{
    Course,
    CourseCreate,
    CourseModule,
    CourseModuleCreate,
    Lesson,
    LessonCreate,
    UserEntity,
    UserEntityCreateUpdate,
};
use academy::web::{AuthenticatedUser, UserRole};

#[derive(Parser, Debug)]
#[command(about = "CLI tool for seeding the academy DB", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Manage courses
    Course {
        #[command(subcommand)]
        action: CourseCommands,
    },

    /// Manage modules
    Module {
        #[command(subcommand)]
        action: ModuleCommands,
    },

    /// Manage lessons
    Lesson {
        #[command(subcommand)]
        action: LessonCommands,
    },
}

/// User management
#[derive(Subcommand, Debug)]
pub enum UserCommands {
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        password: String,
        /// `student`, `instructor` or `admin`
        #[arg(long, default_value = "student")]
        role: String,
    },
}

/// Course management
#[derive(Subcommand, Debug)]
pub enum CourseCommands {
    Add {
        /// Email of the instructor who owns the course
        #[arg(long)]
        instructor: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "beginner")]
        level: String,
        /// Price in cents, 0 for free courses
        #[arg(long, default_value_t = 0)]
        price_cents: i64,
    },
    Publish {
        #[arg(long)]
        slug: String,
    },
}

/// Module management
#[derive(Subcommand, Debug)]
pub enum ModuleCommands {
    Add {
        /// Slug of the course to attach the module to
        #[arg(long)]
        course: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        order_index: Option<i32>,
    },
}

/// Lesson management
#[derive(Subcommand, Debug)]
pub enum LessonCommands {
    Add {
        /// Slug of the course
        #[arg(long)]
        course: String,
        /// Module title inside that course
        #[arg(long)]
        module_title: String,
        #[arg(long)]
        title: String,
        /// Path to a Markdown file with lesson content
        #[arg(long)]
        file: String,
        #[arg(long, default_value = "text")]
        content_type: String,
        #[arg(long)]
        video_url: Option<String>,
        #[arg(long)]
        duration_minutes: Option<i32>,
        #[arg(long, default_value_t = false)]
        free_preview: bool,
        #[arg(long)]
        order_index: Option<i32>,
    },
}

async fn course_id_by_slug(mm: &ModelManager, slug: &str) -> Result<uuid::Uuid, DatabaseError> {
    let course = Course::find_by_slug(mm, slug)
        .await?
        .ok_or(DatabaseError::SqlxError(sqlx::Error::RowNotFound))?;
    Ok(course.id())
}

#[tokio::main]
async fn main() -> academy::error::AppResult<()> {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
        eprintln!("DATABASE_URL is not set");
        std::process::exit(2);
    });
    let db_con = DbConnection::connect(&database_url)?;
    let mm = ModelManager::new(db_con);
    let actor = AuthenticatedUser::admin();

    match args.command {
        Commands::User { action } => match action {
            UserCommands::Add { email, full_name, password, role } => {
                let user = UserEntity::create(
                    &mm,
                    &actor,
                    UserEntityCreateUpdate {
                        email,
                        full_name,
                        password_hash: academy::auth::hash_password(&password)?,
                    },
                )
                .await?;
                let user = user.set_role(&mm, UserRole::from(role.as_str())).await?;
                println!("User created: {} ({})", user.email(), user.role());
            }
        },

        Commands::Course { action } => match action {
            CourseCommands::Add { instructor, title, description, category, level, price_cents } => {
                let owner = UserEntity::find_by_email(&mm, &instructor)
                    .await?
                    .ok_or(DatabaseError::SqlxError(sqlx::Error::RowNotFound))?;
                let owner = AuthenticatedUser::new(owner.id(), owner.role());

                let course = Course::create(
                    &mm,
                    &owner,
                    CourseCreate {
                        title,
                        subtitle: None,
                        description,
                        thumbnail_url: None,
                        category,
                        level: Some(level),
                        price_cents,
                        currency: None,
                        is_free: price_cents == 0,
                        status: None,
                    },
                )
                .await?;
                println!("Course created: {} ({})", course.title(), course.slug());
            }

            CourseCommands::Publish { slug } => {
                let updated = sqlx::query("UPDATE courses SET status = 'published', updated_at = now() WHERE slug = $1")
                    .bind(&slug)
                    .execute(mm.executor())
                    .await
                    .map_err(DatabaseError::SqlxError)?;
                if updated.rows_affected() == 0 {
                    eprintln!("No course with slug {slug}");
                } else {
                    println!("Course published: {slug}");
                }
            }
        },

        Commands::Module { action } => match action {
            ModuleCommands::Add { course, title, description, order_index } => {
                let course_id = course_id_by_slug(&mm, &course).await?;
                let module = CourseModule::create(
                    &mm,
                    &actor,
                    CourseModuleCreate {
                        course_id,
                        title,
                        description,
                        order_index,
                    },
                )
                .await?;
                println!("Module created: {:?}", module);
            }
        },

        Commands::Lesson { action } => match action {
            LessonCommands::Add {
                course,
                module_title,
                title,
                file,
                content_type,
                video_url,
                duration_minutes,
                free_preview,
                order_index,
            } => {
                let course_id = course_id_by_slug(&mm, &course).await?;
                let module_id: uuid::Uuid =
                    sqlx::query_scalar("SELECT id FROM modules WHERE course_id = $1 AND title = $2")
                        .bind(course_id)
                        .bind(&module_title)
                        .fetch_one(mm.executor())
                        .await
                        .map_err(DatabaseError::SqlxError)?;

                let content = std::fs::read_to_string(file)?;
                let lesson = Lesson::create(
                    &mm,
                    &actor,
                    LessonCreate {
                        course_id,
                        module_id,
                        title,
                        content,
                        content_type: Some(content_type),
                        video_url,
                        duration_minutes,
                        is_free_preview: free_preview,
                        order_index,
                    },
                )
                .await?;
                println!("Lesson created: {:?}", lesson);
            }
        },
    }

    Ok(())
}
