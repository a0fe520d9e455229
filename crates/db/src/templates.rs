//! User-defined template CRUD. Builtin templates live in the gateway;
//! these rows take precedence during fallback resolution.

use argus_domain::service::Service;
use argus_domain::template::Template;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::Database;

fn template_from_row(row: &PgRow) -> Result<Template, sqlx::Error> {
    let service_str: String = row.try_get("service")?;
    Ok(Template {
        id: row.try_get("id")?,
        service: Service::parse(&service_str)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown service '{service_str}'").into()))?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        scan_type: row.try_get("scan_type")?,
        arguments: row.try_get("arguments")?,
        is_default: row.try_get("is_default")?,
        created_at: row.try_get("created_at")?,
    })
}

impl Database {
    pub async fn create_template(&self, template: &Template) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO templates
               (id, service, name, description, scan_type, arguments, is_default, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(template.id)
        .bind(template.service.as_str())
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.scan_type)
        .bind(&template.arguments)
        .bind(template.is_default)
        .bind(template.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_template(&self, id: Uuid) -> Result<Option<Template>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM templates WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(template_from_row).transpose()
    }

    pub async fn list_templates(&self, service: Service) -> Result<Vec<Template>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM templates WHERE service = $1 ORDER BY created_at DESC",
        )
        .bind(service.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(template_from_row).collect()
    }

    /// First user template matching a scan type, newest first. Used by
    /// the config fallback chain before builtins are consulted.
    pub async fn find_template(
        &self,
        service: Service,
        scan_type: &str,
    ) -> Result<Option<Template>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT * FROM templates
             WHERE service = $1 AND scan_type = $2
             ORDER BY is_default DESC, created_at DESC
             LIMIT 1",
        )
        .bind(service.as_str())
        .bind(scan_type)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(template_from_row).transpose()
    }

    pub async fn update_template(&self, template: &Template) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE templates
             SET name = $2, description = $3, scan_type = $4,
                 arguments = $5, is_default = $6
             WHERE id = $1",
        )
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.scan_type)
        .bind(&template.arguments)
        .bind(template.is_default)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_template(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM templates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
