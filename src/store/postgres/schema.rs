//! Diesel schema for tasks and generation records.

diesel::table! {
    tasks (id) {
        id -> Uuid,
        user_id -> Uuid,
        #[max_length = 255]
        title -> Varchar,
        description -> Nullable<Text>,
        /// One of `manual`, `ai_full`, `ai_edited`.
        #[max_length = 20]
        source -> Varchar,
        completed -> Bool,
        created_at -> Timestamptz,
        parent_task_id -> Nullable<Uuid>,
        generation_id -> Nullable<Uuid>,
        position -> Int4,
    }
}

diesel::table! {
    generation_process (id) {
        id -> Uuid,
        user_id -> Uuid,
        #[max_length = 255]
        model -> Varchar,
        /// Lower-case hex SHA-256 of the prompt text.
        #[max_length = 64]
        source_text_hash -> Varchar,
        duration_ms -> Int8,
        generated_count -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    generation_process_error_logs (id) {
        id -> Uuid,
        user_id -> Uuid,
        #[max_length = 64]
        source_text_hash -> Varchar,
        #[max_length = 255]
        model -> Varchar,
        #[max_length = 100]
        error_code -> Varchar,
        error_message -> Text,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(tasks -> generation_process (generation_id));
diesel::allow_tables_to_appear_in_same_query!(
    tasks,
    generation_process,
    generation_process_error_logs,
);
