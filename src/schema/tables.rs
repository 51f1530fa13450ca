//! Table declarations for the meeting store.

use super::{Column, ColumnType as T, Constraint, Index, Table};

const NOW: &str = "now()";
const EMPTY_JSON: &str = "'{}'::jsonb";

pub const USERS: Table = Table {
    name: "users",
    columns: &[
        Column::new("id", T::Serial).not_null(),
        Column::new("email", T::Varchar(Some(255))).not_null(),
        Column::new("name", T::Varchar(Some(100))),
        Column::new("image_url", T::Text),
        Column::new("created_at", T::Timestamp).server_default(NOW),
        Column::new("max_concurrent_bots", T::Integer)
            .not_null()
            .server_default("1"),
        Column::new("data", T::Jsonb).not_null().server_default(EMPTY_JSON),
    ],
    constraints: &[Constraint::PrimaryKey {
        name: "users_pkey",
        column: "id",
    }],
    indexes: &[
        Index::on("ix_users_id", &["id"]),
        Index::on("ix_users_email", &["email"]).unique(),
    ],
};

pub const API_TOKENS: Table = Table {
    name: "api_tokens",
    columns: &[
        Column::new("id", T::Serial).not_null(),
        Column::new("token", T::Varchar(Some(255))).not_null(),
        Column::new("user_id", T::Integer).not_null(),
        Column::new("created_at", T::Timestamp).server_default(NOW),
    ],
    constraints: &[
        Constraint::PrimaryKey {
            name: "api_tokens_pkey",
            column: "id",
        },
        Constraint::ForeignKey {
            name: "api_tokens_user_id_fkey",
            column: "user_id",
            references: "users",
            referenced_column: "id",
        },
    ],
    indexes: &[
        Index::on("ix_api_tokens_id", &["id"]),
        Index::on("ix_api_tokens_token", &["token"]).unique(),
        Index::on("ix_api_tokens_user_id", &["user_id"]),
    ],
};

pub const MEETINGS: Table = Table {
    name: "meetings",
    columns: &[
        Column::new("id", T::Serial).not_null(),
        Column::new("user_id", T::Integer).not_null(),
        Column::new("platform", T::Varchar(Some(100))).not_null(),
        Column::new("platform_specific_id", T::Varchar(Some(255))),
        Column::new("status", T::Varchar(Some(50))).not_null(),
        Column::new("bot_container_id", T::Varchar(Some(255))),
        Column::new("start_time", T::Timestamp),
        Column::new("end_time", T::Timestamp),
        Column::new("data", T::Jsonb).not_null().server_default(EMPTY_JSON),
        Column::new("created_at", T::Timestamp).server_default(NOW),
        Column::new("updated_at", T::Timestamp).server_default(NOW),
    ],
    constraints: &[
        Constraint::PrimaryKey {
            name: "meetings_pkey",
            column: "id",
        },
        Constraint::ForeignKey {
            name: "meetings_user_id_fkey",
            column: "user_id",
            references: "users",
            referenced_column: "id",
        },
    ],
    indexes: &[
        Index::on("ix_meetings_id", &["id"]),
        Index::on("ix_meetings_user_id", &["user_id"]),
        Index::on("ix_meetings_platform_specific_id", &["platform_specific_id"]),
        Index::on("ix_meetings_status", &["status"]),
        Index::on("ix_meetings_created_at", &["created_at"]),
        Index::on(
            "ix_meeting_user_platform_native_id_created_at",
            &["user_id", "platform", "platform_specific_id", "created_at"],
        ),
        Index::on("ix_meeting_data_gin", &["data"]).gin(),
    ],
};

pub const TRANSCRIPTIONS: Table = Table {
    name: "transcriptions",
    columns: &[
        Column::new("id", T::Serial).not_null(),
        Column::new("meeting_id", T::Integer).not_null(),
        Column::new("start_time", T::DoublePrecision).not_null(),
        Column::new("end_time", T::DoublePrecision).not_null(),
        Column::new("text", T::Text).not_null(),
        Column::new("speaker", T::Varchar(Some(255))),
        Column::new("language", T::Varchar(Some(10))),
        Column::new("created_at", T::Timestamp),
        Column::new("session_uid", T::Varchar(None)),
    ],
    constraints: &[
        Constraint::PrimaryKey {
            name: "transcriptions_pkey",
            column: "id",
        },
        Constraint::ForeignKey {
            name: "transcriptions_meeting_id_fkey",
            column: "meeting_id",
            references: "meetings",
            referenced_column: "id",
        },
    ],
    indexes: &[
        Index::on("ix_transcriptions_id", &["id"]),
        Index::on("ix_transcriptions_meeting_id", &["meeting_id"]),
        Index::on("ix_transcriptions_session_uid", &["session_uid"]),
        Index::on("ix_transcription_meeting_start", &["meeting_id", "start_time"]),
    ],
};

pub const MEETING_SESSIONS: Table = Table {
    name: "meeting_sessions",
    columns: &[
        Column::new("id", T::Serial).not_null(),
        Column::new("meeting_id", T::Integer).not_null(),
        Column::new("session_uid", T::Varchar(None)).not_null(),
        Column::new("session_start_time", T::TimestampTz)
            .not_null()
            .server_default(NOW),
    ],
    constraints: &[
        Constraint::PrimaryKey {
            name: "meeting_sessions_pkey",
            column: "id",
        },
        Constraint::ForeignKey {
            name: "meeting_sessions_meeting_id_fkey",
            column: "meeting_id",
            references: "meetings",
            referenced_column: "id",
        },
        Constraint::Unique {
            name: "_meeting_session_uc",
            columns: &["meeting_id", "session_uid"],
        },
    ],
    indexes: &[
        Index::on("ix_meeting_sessions_id", &["id"]),
        Index::on("ix_meeting_sessions_meeting_id", &["meeting_id"]),
        Index::on("ix_meeting_sessions_session_uid", &["session_uid"]),
    ],
};

/// All tables, parents first.
pub const TABLES: &[Table] = &[USERS, API_TOKENS, MEETINGS, TRANSCRIPTIONS, MEETING_SESSIONS];
