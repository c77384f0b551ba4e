const PRODUCTION_HOST: &str = "https://firestore.googleapis.com";

/// Firestore REST URL for a database's document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirestoreURL {
    base: String,
    database_path: String,
}

impl AsRef<str> for FirestoreURL {
    fn as_ref(&self) -> &str {
        &self.base
    }
}

impl FirestoreURL {
    /// URL of the hosted service.
    pub fn production(project_id: &str, database: &str) -> Self {
        Self::with_host(PRODUCTION_HOST, project_id, database)
    }

    /// URL of a local emulator, e.g. `localhost:8080`.
    pub fn emulator(host: &str, project_id: &str, database: &str) -> Self {
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };
        Self::with_host(&host, project_id, database)
    }

    fn with_host(host: &str, project_id: &str, database: &str) -> Self {
        let database_path = format!("projects/{}/databases/{}", project_id, database);
        Self {
            base: format!("{}/v1/{}/documents", host.trim_end_matches('/'), database_path),
            database_path,
        }
    }

    /// Resource name of a document, as used inside request bodies.
    pub fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/documents/{}/{}", self.database_path, collection, id)
    }

    /// Append the given path to the URL.
    pub fn append_path(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub fn document(&self, collection: &str, id: &str) -> String {
        self.append_path(&format!("{}/{}", collection, id))
    }

    /// URL of a database-level RPC such as `commit` or `runQuery`.
    pub fn rpc(&self, method: &str) -> String {
        format!("{}:{}", self.base, method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_document_url() {
        let url = FirestoreURL::production("poker", "(default)");
        assert_eq!(
            url.document("projects", "p1"),
            "https://firestore.googleapis.com/v1/projects/poker/databases/(default)/documents/projects/p1"
        );
    }

    #[test]
    fn emulator_adds_scheme() {
        let url = FirestoreURL::emulator("localhost:8080", "poker", "(default)");
        assert_eq!(
            url.rpc("commit"),
            "http://localhost:8080/v1/projects/poker/databases/(default)/documents:commit"
        );
    }

    #[test]
    fn document_name_is_relative_resource_name() {
        let url = FirestoreURL::production("poker", "(default)");
        assert_eq!(
            url.document_name("sprints", "s1"),
            "projects/poker/databases/(default)/documents/sprints/s1"
        );
    }
}
