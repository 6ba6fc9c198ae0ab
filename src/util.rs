const MAIL_API_KEY: &str = "MAIL_API_KEY";

pub fn get_mail_api_key() -> Option<String> {
    let key_from_env = std::env::var(MAIL_API_KEY);
    key_from_env.ok()
}

const DATABASE_PATH: &str = "DATABASE_PATH";

pub fn get_database_path() -> Option<String> {
    let path_from_env = std::env::var(DATABASE_PATH);
    path_from_env.ok()
}
