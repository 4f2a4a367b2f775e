// ABOUTME: Integration tests for the nginx, apache, and traefik proxy managers.
// ABOUTME: Config files go to temp dirs; proxy binaries are scripted.

mod support;

use archon_agent::ErrorKind;
use archon_agent::certs::CertificatePaths;
use archon_agent::config::{ProxyKind, ProxySettings, SslMode};
use archon_agent::process::CommandOutput;
use archon_agent::proxy::{self, ApacheManager, NginxManager, ProxyManager, TraefikManager};
use archon_agent::site::{DeployRequest, DomainMapping};
use archon_agent::types::SiteId;
use std::path::Path;
use std::sync::Arc;
use support::RecordingRunner;

fn request(ssl: bool) -> DeployRequest {
    let mut mapping = DomainMapping::new("blog.example.com", 3000);
    mapping.host_port = Some(8081);
    let mut req = DeployRequest::container(SiteId::new(), "blog", "ghost:5").with_domain(mapping);
    req.ssl_enabled = ssl;
    req
}

fn cert(dir: &Path) -> CertificatePaths {
    CertificatePaths {
        cert: dir.join("cert.pem"),
        key: dir.join("key.pem"),
    }
}

mod nginx {
    use super::*;

    fn manager(dir: &Path, mode: SslMode, runner: Arc<RecordingRunner>) -> NginxManager {
        NginxManager::new(
            dir.join("sites"),
            "nginx -s reload".to_string(),
            mode,
            dir.join("webroot"),
            runner,
        )
    }

    #[tokio::test]
    async fn plain_http_site_proxies_to_published_port() {
        support::init_tracing();
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let nginx = manager(tmp.path(), SslMode::Letsencrypt, runner.clone());

        nginx.configure(&request(false), None).await.unwrap();

        let conf = std::fs::read_to_string(nginx.site_config("blog.example.com")).unwrap();
        assert!(conf.contains("server_name blog.example.com;"));
        assert!(conf.contains("proxy_pass http://127.0.0.1:8081;"));
        assert!(!conf.contains("listen 443"));
        assert_eq!(runner.calls(), vec!["nginx -t"]);
    }

    #[tokio::test]
    async fn tls_site_redirects_and_references_certificate() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let nginx = manager(tmp.path(), SslMode::Letsencrypt, runner.clone());
        let paths = cert(tmp.path());

        nginx.configure(&request(true), Some(&paths)).await.unwrap();

        let conf = std::fs::read_to_string(nginx.site_config("blog.example.com")).unwrap();
        assert!(conf.contains("return 301 https://$server_name$request_uri;"));
        assert!(conf.contains("listen 443 ssl http2;"));
        assert!(conf.contains(&format!("ssl_certificate {};", paths.cert.display())));
        assert!(conf.contains(&format!("ssl_certificate_key {};", paths.key.display())));
    }

    #[tokio::test]
    async fn tls_without_certificate_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let nginx = manager(tmp.path(), SslMode::Letsencrypt, Arc::new(RecordingRunner::new()));

        let err = nginx.configure(&request(true), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
    }

    #[tokio::test]
    async fn failed_syntax_check_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("nginx -t", CommandOutput::failed(1, "unknown directive"));
        let nginx = manager(tmp.path(), SslMode::Letsencrypt, runner);

        let err = nginx.configure(&request(false), None).await.unwrap_err();
        assert!(err.to_string().contains("unknown directive"));
        assert_eq!(err.kind(), ErrorKind::ExternalTool);
        assert!(!nginx.site_config("blog.example.com").exists());
    }

    #[tokio::test]
    async fn rejected_config_puts_the_previous_one_back() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("nginx -t", CommandOutput::failed(1, "emerg"));
        let nginx = manager(tmp.path(), SslMode::Letsencrypt, runner);
        std::fs::create_dir_all(tmp.path().join("sites")).unwrap();
        std::fs::write(nginx.site_config("blog.example.com"), "working config").unwrap();

        nginx.configure(&request(false), None).await.unwrap_err();

        assert_eq!(
            std::fs::read_to_string(nginx.site_config("blog.example.com")).unwrap(),
            "working config"
        );
    }

    #[tokio::test]
    async fn removing_validation_brings_back_the_site_config() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let nginx = manager(tmp.path(), SslMode::Letsencrypt, runner);
        let req = request(true);
        std::fs::create_dir_all(tmp.path().join("sites")).unwrap();
        std::fs::write(nginx.site_config("blog.example.com"), "live tls config").unwrap();

        nginx.configure_for_validation(&req).await.unwrap();
        nginx.remove_validation(&req).await.unwrap();

        assert!(!nginx.validation_config("blog.example.com").exists());
        assert_eq!(
            std::fs::read_to_string(nginx.site_config("blog.example.com")).unwrap(),
            "live tls config"
        );
        // Nothing left to restore the second time.
        nginx.remove_validation(&req).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_tls_config_after_validation_restores_the_live_site() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("nginx -t", CommandOutput::failed(1, "cannot load certificate"));
        let nginx = manager(tmp.path(), SslMode::Letsencrypt, runner);
        let req = request(true);
        std::fs::create_dir_all(tmp.path().join("sites")).unwrap();
        std::fs::write(nginx.site_config("blog.example.com"), "live tls config").unwrap();

        nginx.configure_for_validation(&req).await.unwrap();
        nginx.configure(&req, Some(&cert(tmp.path()))).await.unwrap_err();

        assert!(!nginx.validation_config("blog.example.com").exists());
        assert_eq!(
            std::fs::read_to_string(nginx.site_config("blog.example.com")).unwrap(),
            "live tls config"
        );
    }

    #[tokio::test]
    async fn validation_config_serves_challenges_then_gets_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let nginx = manager(tmp.path(), SslMode::Letsencrypt, runner.clone());
        let req = request(true);
        std::fs::create_dir_all(tmp.path().join("sites")).unwrap();
        std::fs::write(nginx.site_config("blog.example.com"), "stale tls config").unwrap();

        nginx.configure_for_validation(&req).await.unwrap();

        let validation = nginx.validation_config("blog.example.com");
        let conf = std::fs::read_to_string(&validation).unwrap();
        assert!(conf.contains("location /.well-known/acme-challenge/"));
        assert!(conf.contains(&format!("root {};", tmp.path().join("webroot").display())));
        assert!(!nginx.site_config("blog.example.com").exists());
        assert!(tmp.path().join("webroot").is_dir());
        // Reload only; a syntax check could trip over other sites' certificates.
        assert_eq!(runner.calls(), vec!["sh -c nginx -s reload"]);

        nginx.configure(&req, Some(&cert(tmp.path()))).await.unwrap();
        assert!(!validation.exists());
        assert!(nginx.site_config("blog.example.com").exists());
    }

    #[tokio::test]
    async fn validation_is_skipped_outside_letsencrypt() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let nginx = manager(tmp.path(), SslMode::Manual, runner.clone());

        nginx.configure_for_validation(&request(true)).await.unwrap();

        assert!(runner.calls().is_empty());
        assert!(!nginx.validation_config("blog.example.com").exists());
    }

    #[tokio::test]
    async fn remove_deletes_both_files_and_tolerates_missing_ones() {
        let tmp = tempfile::tempdir().unwrap();
        let nginx = manager(tmp.path(), SslMode::Letsencrypt, Arc::new(RecordingRunner::new()));
        let req = request(false);
        nginx.configure(&req, None).await.unwrap();

        nginx.remove(&req.id, "blog.example.com").await.unwrap();
        assert!(!nginx.site_config("blog.example.com").exists());
        nginx.remove(&req.id, "blog.example.com").await.unwrap();
    }

    #[tokio::test]
    async fn reload_checks_syntax_first() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let nginx = manager(tmp.path(), SslMode::Letsencrypt, runner.clone());

        nginx.reload().await.unwrap();
        assert_eq!(runner.calls(), vec!["nginx -t", "sh -c nginx -s reload"]);
    }

    #[tokio::test]
    async fn info_counts_site_files() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("nginx -v", CommandOutput::failed(0, "nginx version: nginx/1.24.0"));
        let nginx = manager(tmp.path(), SslMode::Letsencrypt, runner);
        nginx.configure(&request(false), None).await.unwrap();

        let info = nginx.info().await.unwrap();
        assert_eq!(info.kind, ProxyKind::Nginx);
        assert_eq!(info.version, "nginx version: nginx/1.24.0");
        assert_eq!(info.routers, 1);
    }
}

mod apache {
    use super::*;

    fn manager(dir: &Path, mode: SslMode, runner: Arc<RecordingRunner>) -> ApacheManager {
        ApacheManager::new(
            dir.join("sites-available"),
            "systemctl reload apache2".to_string(),
            mode,
            runner,
        )
    }

    #[tokio::test]
    async fn configure_tests_enables_and_reloads() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let apache = manager(tmp.path(), SslMode::Letsencrypt, runner.clone());

        apache.configure(&request(false), None).await.unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "apache2ctl configtest",
                "a2ensite blog.example.com.conf",
                "sh -c systemctl reload apache2",
            ]
        );
        let conf = std::fs::read_to_string(apache.site_config("blog.example.com")).unwrap();
        assert!(conf.contains("ServerName blog.example.com"));
        assert!(conf.contains("ProxyPass / http://127.0.0.1:8081/"));
        assert!(!conf.contains("<VirtualHost *:443>"));
    }

    #[tokio::test]
    async fn tls_vhost_has_redirect_and_certificate() {
        let tmp = tempfile::tempdir().unwrap();
        let apache = manager(tmp.path(), SslMode::Manual, Arc::new(RecordingRunner::new()));
        let paths = cert(tmp.path());

        apache.configure(&request(true), Some(&paths)).await.unwrap();

        let conf = std::fs::read_to_string(apache.site_config("blog.example.com")).unwrap();
        assert!(conf.contains("RewriteRule ^ https://%{HTTP_HOST}%{REQUEST_URI} [R=301,L]"));
        assert!(conf.contains("<VirtualHost *:443>"));
        assert!(conf.contains(&format!("SSLCertificateFile {}", paths.cert.display())));
        assert!(conf.contains("${APACHE_LOG_DIR}/blog.example.com_error.log"));
    }

    #[tokio::test]
    async fn syntax_ok_warning_still_passes() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond(
            "apache2ctl configtest",
            CommandOutput::failed(1, "AH00558: could not reliably determine FQDN\nSyntax OK"),
        );
        let apache = manager(tmp.path(), SslMode::Letsencrypt, runner.clone());

        apache.configure(&request(false), None).await.unwrap();
        assert!(runner.called("a2ensite"));
    }

    #[tokio::test]
    async fn syntax_error_stops_before_enabling() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond(
            "apache2ctl configtest",
            CommandOutput::failed(1, "AH00526: Syntax error on line 4"),
        );
        let apache = manager(tmp.path(), SslMode::Letsencrypt, runner.clone());

        let err = apache.configure(&request(false), None).await.unwrap_err();
        assert!(err.to_string().contains("AH00526"));
        assert!(!runner.called("a2ensite"));
        assert!(!apache.site_config("blog.example.com").exists());
        assert!(!runner.called("sh -c systemctl reload apache2"));
    }

    #[tokio::test]
    async fn syntax_error_puts_the_previous_vhost_back() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond(
            "apache2ctl configtest",
            CommandOutput::failed(1, "AH00526: Syntax error on line 4"),
        );
        let apache = manager(tmp.path(), SslMode::Letsencrypt, runner.clone());
        std::fs::create_dir_all(tmp.path().join("sites-available")).unwrap();
        std::fs::write(apache.site_config("blog.example.com"), "working vhost").unwrap();

        apache.configure(&request(false), None).await.unwrap_err();

        assert_eq!(
            std::fs::read_to_string(apache.site_config("blog.example.com")).unwrap(),
            "working vhost"
        );
        assert!(!runner.called("a2dissite"));
    }

    #[tokio::test]
    async fn failed_enable_is_cleaned_up() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("a2ensite", CommandOutput::failed(1, "ERROR: Site does not exist"));
        let apache = manager(tmp.path(), SslMode::Letsencrypt, runner.clone());

        let err = apache.configure(&request(false), None).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ExternalTool);
        assert!(runner.called("a2dissite blog.example.com.conf"));
        assert!(!apache.site_config("blog.example.com").exists());
    }

    #[tokio::test]
    async fn removing_validation_restores_the_previous_vhost() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let apache = manager(tmp.path(), SslMode::Letsencrypt, runner.clone());
        let req = request(true);
        std::fs::create_dir_all(tmp.path().join("sites-available")).unwrap();
        std::fs::write(apache.site_config("blog.example.com"), "live tls vhost").unwrap();

        apache.configure_for_validation(&req).await.unwrap();
        let conf = std::fs::read_to_string(apache.site_config("blog.example.com")).unwrap();
        assert_ne!(conf, "live tls vhost");

        apache.remove_validation(&req).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(apache.site_config("blog.example.com")).unwrap(),
            "live tls vhost"
        );
    }

    #[tokio::test]
    async fn removing_validation_of_a_new_site_disables_it() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let apache = manager(tmp.path(), SslMode::Letsencrypt, runner.clone());
        let req = request(true);

        apache.configure_for_validation(&req).await.unwrap();
        apache.remove_validation(&req).await.unwrap();

        assert!(runner.called("a2dissite blog.example.com.conf"));
        assert!(!apache.site_config("blog.example.com").exists());
    }

    #[tokio::test]
    async fn remove_disables_then_deletes() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("a2dissite", CommandOutput::failed(1, "site does not exist"));
        let apache = manager(tmp.path(), SslMode::Letsencrypt, runner.clone());
        let req = request(false);
        apache.configure(&req, None).await.unwrap();

        apache.remove(&req.id, "blog.example.com").await.unwrap();

        assert!(runner.called("a2dissite blog.example.com.conf"));
        assert!(!apache.site_config("blog.example.com").exists());
    }

    #[tokio::test]
    async fn info_strips_server_version_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("sites-available")).unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond(
            "apache2 -v",
            CommandOutput::ok("Server version: Apache/2.4.58 (Ubuntu)\nServer built: 2024"),
        );
        let apache = manager(tmp.path(), SslMode::Letsencrypt, runner);

        let info = apache.info().await.unwrap();
        assert_eq!(info.version, "Apache/2.4.58 (Ubuntu)");
        assert_eq!(info.routers, 0);
    }
}

mod traefik {
    use super::*;

    #[tokio::test]
    async fn file_operations_are_no_ops() {
        let traefik = TraefikManager::new(None);
        let req = request(true);
        traefik.configure_for_validation(&req).await.unwrap();
        traefik.remove_validation(&req).await.unwrap();
        traefik.configure(&req, None).await.unwrap();
        traefik.remove(&req.id, "blog.example.com").await.unwrap();
        traefik.reload().await.unwrap();
    }

    #[test]
    fn deployment_labels_route_by_host() {
        let traefik = TraefikManager::new(None);
        let labels = traefik.deployment_labels(&request(false));
        assert_eq!(labels.get("traefik.enable").map(String::as_str), Some("true"));
        assert_eq!(
            labels.get("traefik.http.routers.blog.rule").map(String::as_str),
            Some("Host(`blog.example.com`)")
        );
    }
}

#[test]
fn build_picks_the_configured_backend() {
    let runner = Arc::new(RecordingRunner::new());
    for kind in [ProxyKind::Nginx, ProxyKind::Apache, ProxyKind::Traefik] {
        let settings = ProxySettings {
            kind,
            ..Default::default()
        };
        let manager = proxy::build(
            &settings,
            SslMode::Manual,
            Path::new("/var/www/certbot"),
            runner.clone(),
        );
        assert_eq!(manager.kind(), kind);
    }
}
