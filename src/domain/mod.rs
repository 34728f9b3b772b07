pub mod category_name;
pub mod models;
pub mod rules;
