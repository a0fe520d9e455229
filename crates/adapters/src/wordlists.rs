//! Builtin wordlists used by the DNS subdomain sweep and API surface
//! discovery. External wordlist files (ffuf) are configured separately.

/// Common subdomain labels probed in DNS subdomain mode.
pub const COMMON_SUBDOMAINS: &[&str] = &[
    "www", "mail", "ftp", "smtp", "pop", "imap", "webmail", "ns1", "ns2",
    "ns3", "dns", "mx", "api", "dev", "staging", "stage", "test", "testing",
    "demo", "beta", "alpha", "preview", "app", "apps", "portal", "admin",
    "administrator", "intranet", "internal", "corp", "vpn", "remote", "gateway",
    "proxy", "cdn", "static", "assets", "img", "images", "media", "files",
    "download", "downloads", "upload", "docs", "wiki", "help", "support",
    "status", "monitor", "monitoring", "grafana", "kibana", "jenkins", "ci",
    "git", "gitlab", "svn", "repo", "db", "database", "mysql", "postgres",
    "redis", "cache", "search", "ldap", "sso", "auth", "login", "id",
    "identity", "shop", "store", "blog", "news", "forum", "community", "m",
    "mobile", "secure", "payment", "payments", "billing", "crm", "erp",
    "backup", "old", "legacy", "new", "cloud", "mail2", "smtp2", "ns4",
];

/// Route words probed by API route discovery.
pub const API_ROUTE_WORDS: &[&str] = &[
    "api", "v1", "v2", "v3", "users", "user", "accounts", "account", "auth",
    "login", "logout", "register", "token", "tokens", "refresh", "me",
    "profile", "settings", "config", "admin", "health", "healthz", "status",
    "ping", "version", "info", "metrics", "search", "items", "products",
    "orders", "cart", "checkout", "payments", "invoices", "customers",
    "files", "upload", "download", "export", "import", "reports", "events",
    "notifications", "messages", "webhooks", "graphql", "docs", "swagger",
];

/// Parameter names probed by API parameter discovery.
pub const API_PARAM_WORDS: &[&str] = &[
    "id", "user_id", "page", "limit", "offset", "sort", "order", "filter",
    "q", "query", "search", "fields", "include", "expand", "format", "lang",
    "locale", "token", "key", "api_key", "callback", "redirect", "url",
    "next", "debug", "test", "admin", "role", "type", "status", "from", "to",
];

/// Paths probed for OpenAPI / Swagger documents.
pub const OPENAPI_PATHS: &[&str] = &[
    "/swagger.json",
    "/openapi.json",
    "/api-docs",
    "/api/swagger.json",
    "/api/openapi.json",
    "/v1/swagger.json",
    "/v2/swagger.json",
    "/v3/api-docs",
    "/docs/swagger.json",
    "/swagger/v1/swagger.json",
    "/openapi.yaml",
    "/api/docs",
];

/// Paths probed for a GraphQL endpoint.
pub const GRAPHQL_PATHS: &[&str] = &["/graphql", "/api/graphql", "/v1/graphql", "/query"];
