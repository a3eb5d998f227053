//! Entity catalogue of the campus admin platform.

use serde_json::Value;

use crate::model::{EntitySchema, ModelError, ModelRegistry};
use crate::plugins::NotificationRule;
use crate::store::Document;

fn text<'a>(doc: &'a Document, field: &str) -> &'a str {
    doc.get(field).and_then(Value::as_str).unwrap_or("")
}

fn verb(is_new: bool) -> &'static str {
    if is_new {
        "Created"
    } else {
        "Updated"
    }
}

pub fn absence() -> EntitySchema {
    EntitySchema::builder("Absence")
        .reference("student", "User")
        .reference("classroom", "Classroom")
        .field("date")
        .field("reason")
        .field("justified")
        .notify(NotificationRule::on_create(|doc| format!("New absence recorded for {}", text(doc, "date"))))
        .audit("absence", |doc, is_new| format!("{} absence on {}", verb(is_new), text(doc, "date")))
        .build()
}

pub fn activity() -> EntitySchema {
    EntitySchema::builder("Activity")
        .field("name")
        .field("description")
        .field("date")
        .reference("classroom", "Classroom")
        .reference("participants", "User")
        .notify(NotificationRule::on_create(|doc| format!("New activity: {}", text(doc, "name"))))
        .audit("activity", |doc, is_new| format!("{} activity {}", verb(is_new), text(doc, "name")))
        .build()
}

pub fn assignment() -> EntitySchema {
    EntitySchema::builder("Assignment")
        .field("title")
        .field("description")
        .field("due_date")
        .reference("classroom", "Classroom")
        .reference("teacher", "User")
        .notify(NotificationRule::on_create(|doc| format!("New assignment: {}", text(doc, "title"))))
        .notify(NotificationRule::on_update(|doc| format!("Assignment updated: {}", text(doc, "title"))))
        .notify(NotificationRule::on_delete(|doc| format!("Assignment withdrawn: {}", text(doc, "title"))))
        .audit("assignment", |doc, is_new| format!("{} assignment {}", verb(is_new), text(doc, "title")))
        .build()
}

pub fn classroom() -> EntitySchema {
    EntitySchema::builder("Classroom")
        .field("name")
        .field("level")
        .reference("teacher", "User")
        .reference("students", "User")
        .audit("classroom", |doc, is_new| format!("{} classroom {}", verb(is_new), text(doc, "name")))
        .build()
}

/// Customers are the tenant registry itself and never tenant-routed
pub fn customer() -> EntitySchema {
    EntitySchema::builder("Customer")
        .field("name")
        .field("slug")
        .field("collection_prefix")
        .field("is_active")
        .shared()
        .without_creator()
        .build()
}

pub fn inventory() -> EntitySchema {
    EntitySchema::builder("Inventory")
        .field("name")
        .field("quantity")
        .field("location")
        .reference("classroom", "Classroom")
        .audit("inventory", |doc, is_new| format!("{} inventory item {}", verb(is_new), text(doc, "name")))
        .build()
}

pub fn post() -> EntitySchema {
    EntitySchema::builder("Post")
        .field("title")
        .field("body")
        .reference("author", "User")
        .notify(NotificationRule::on_create(|doc| format!("New post: {}", text(doc, "title"))))
        .build()
}

pub fn user() -> EntitySchema {
    EntitySchema::builder("User")
        .field("name")
        .field("email")
        .field("role")
        .private_field("password")
        .audit("user", |doc, is_new| format!("{} user {}", verb(is_new), text(doc, "email")))
        .build()
}

pub fn all() -> Vec<EntitySchema> {
    vec![absence(), activity(), assignment(), classroom(), customer(), inventory(), post(), user()]
}

pub fn register_all(registry: &mut ModelRegistry) -> Result<(), ModelError> {
    for schema in all() {
        registry.register(schema)?;
    }
    Ok(())
}
