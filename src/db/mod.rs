//! Database module for SQLite persistence using SeaORM

pub mod entities;

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use std::path::Path;

/// Initialize database connection and create tables
pub async fn init_database(db_path: &Path) -> Result<DatabaseConnection, DbErr> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
    tracing::info!("Connecting to database: {}", db_url);

    let db = Database::connect(&db_url).await?;

    // Create tables
    create_tables(&db).await?;

    Ok(db)
}

// Foreign keys deliberately carry no ON DELETE action: dependents are
// removed by the cascade code, and the constraint rejects a parent delete
// that would otherwise orphan them.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS classrooms (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        subject TEXT,
        section TEXT,
        teacher_id INTEGER NOT NULL,
        teacher_name TEXT NOT NULL,
        join_code TEXT NOT NULL UNIQUE,
        card_color TEXT NOT NULL,
        card_banner TEXT,
        allow_member_posts INTEGER NOT NULL DEFAULT 0,
        allow_member_comments INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_classrooms_teacher ON classrooms(teacher_id)"#,
    r#"
    CREATE TABLE IF NOT EXISTS memberships (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        classroom_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        user_name TEXT NOT NULL,
        class_name TEXT NOT NULL,
        class_subject TEXT,
        class_section TEXT,
        teacher_name TEXT NOT NULL,
        card_color TEXT NOT NULL,
        joined_at INTEGER NOT NULL,
        FOREIGN KEY (classroom_id) REFERENCES classrooms(id),
        UNIQUE(classroom_id, user_id)
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_memberships_user ON memberships(user_id)"#,
    r#"
    CREATE TABLE IF NOT EXISTS topics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        classroom_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (classroom_id) REFERENCES classrooms(id),
        UNIQUE(classroom_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        classroom_id INTEGER NOT NULL,
        author_id INTEGER NOT NULL,
        author_name TEXT NOT NULL,
        kind TEXT NOT NULL,
        caption TEXT NOT NULL,
        title TEXT,
        attachments TEXT NOT NULL DEFAULT '[]',
        links TEXT NOT NULL DEFAULT '[]',
        audience TEXT NOT NULL DEFAULT '[]',
        announce_to_all INTEGER NOT NULL DEFAULT 1,
        due_at INTEGER,
        scheduled_at INTEGER,
        is_graded INTEGER NOT NULL DEFAULT 0,
        total_points INTEGER,
        accept_submissions INTEGER NOT NULL DEFAULT 0,
        close_after_due INTEGER NOT NULL DEFAULT 0,
        topic_id INTEGER,
        topic_name TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        FOREIGN KEY (classroom_id) REFERENCES classrooms(id),
        FOREIGN KEY (topic_id) REFERENCES topics(id)
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_posts_classroom ON posts(classroom_id)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_posts_topic ON posts(topic_id)"#,
    r#"
    CREATE TABLE IF NOT EXISTS submissions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER NOT NULL,
        classroom_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        user_name TEXT NOT NULL,
        post_title TEXT NOT NULL,
        attachments TEXT NOT NULL DEFAULT '[]',
        links TEXT NOT NULL DEFAULT '[]',
        is_turned_in INTEGER NOT NULL DEFAULT 0,
        turned_in_at INTEGER,
        is_graded INTEGER NOT NULL DEFAULT 0,
        points INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        FOREIGN KEY (post_id) REFERENCES posts(id),
        FOREIGN KEY (classroom_id) REFERENCES classrooms(id),
        UNIQUE(post_id, user_id)
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_submissions_classroom_user ON submissions(classroom_id, user_id)"#,
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER NOT NULL,
        classroom_id INTEGER NOT NULL,
        author_id INTEGER NOT NULL,
        author_name TEXT NOT NULL,
        author_avatar TEXT,
        body TEXT NOT NULL,
        attachments TEXT NOT NULL DEFAULT '[]',
        links TEXT NOT NULL DEFAULT '[]',
        created_at INTEGER NOT NULL,
        FOREIGN KEY (post_id) REFERENCES posts(id),
        FOREIGN KEY (classroom_id) REFERENCES classrooms(id)
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id)"#,
    r#"
    CREATE TABLE IF NOT EXISTS private_comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER NOT NULL,
        classroom_id INTEGER NOT NULL,
        member_id INTEGER NOT NULL,
        author_id INTEGER NOT NULL,
        author_name TEXT NOT NULL,
        author_avatar TEXT,
        to_user_id INTEGER NOT NULL,
        body TEXT NOT NULL,
        attachments TEXT NOT NULL DEFAULT '[]',
        links TEXT NOT NULL DEFAULT '[]',
        created_at INTEGER NOT NULL,
        FOREIGN KEY (post_id) REFERENCES posts(id),
        FOREIGN KEY (classroom_id) REFERENCES classrooms(id)
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_private_comments_thread ON private_comments(post_id, member_id)"#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        classroom_id INTEGER NOT NULL,
        author_id INTEGER NOT NULL,
        author_name TEXT NOT NULL,
        author_avatar TEXT,
        body TEXT NOT NULL,
        attachments TEXT NOT NULL DEFAULT '[]',
        links TEXT NOT NULL DEFAULT '[]',
        created_at INTEGER NOT NULL,
        FOREIGN KEY (classroom_id) REFERENCES classrooms(id)
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_chat_messages_classroom ON chat_messages(classroom_id)"#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        recipient_id INTEGER NOT NULL,
        actor_id INTEGER NOT NULL,
        classroom_id INTEGER NOT NULL,
        event TEXT NOT NULL,
        resource_kind TEXT NOT NULL,
        resource_id INTEGER NOT NULL,
        summary TEXT NOT NULL,
        link TEXT NOT NULL,
        is_read INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_notifications_resource ON notifications(resource_kind, resource_id)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_notifications_classroom ON notifications(classroom_id)"#,
];

/// Create all tables if they don't exist
async fn create_tables(db: &DatabaseConnection) -> Result<(), DbErr> {
    for sql in SCHEMA {
        db.execute(Statement::from_string(
            db.get_database_backend(),
            sql.to_string(),
        ))
        .await?;
    }

    tracing::info!("Database tables initialized");
    Ok(())
}
