// ABOUTME: Tera templates for the file-based proxy backends.
// ABOUTME: Rendered once per site with a SiteView context.

pub const NGINX_SITE: &str = r#"{% for d in domains -%}
server {
    listen 80;
    server_name {{ d.name }};
{% if ssl %}
    return 301 https://$server_name$request_uri;
}

server {
    listen 443 ssl http2;
    server_name {{ d.name }};

    ssl_certificate {{ cert }};
    ssl_certificate_key {{ key }};
    ssl_protocols TLSv1.2 TLSv1.3;
    ssl_ciphers HIGH:!aNULL:!MD5;
    ssl_prefer_server_ciphers on;

    add_header Strict-Transport-Security "max-age=31536000; includeSubDomains" always;
    add_header X-Frame-Options "SAMEORIGIN" always;
    add_header X-Content-Type-Options "nosniff" always;
{% endif %}
    location / {
        proxy_pass http://127.0.0.1:{{ d.port }};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;

        proxy_http_version 1.1;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection "upgrade";

        proxy_connect_timeout 60s;
        proxy_send_timeout 60s;
        proxy_read_timeout 60s;
    }

    access_log /var/log/nginx/{{ d.name }}_access.log;
    error_log /var/log/nginx/{{ d.name }}_error.log;
}
{% endfor %}"#;

pub const NGINX_VALIDATION: &str = r#"{% for d in domains -%}
server {
    listen 80;
    server_name {{ d.name }};

    location /.well-known/acme-challenge/ {
        root {{ webroot }};
    }

    location / {
        proxy_pass http://127.0.0.1:{{ d.port }};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }
}
{% endfor %}"#;

pub const APACHE_SITE: &str = r#"{% for d in domains -%}
<VirtualHost *:80>
    ServerName {{ d.name }}
{% if ssl %}
    RewriteEngine On
    RewriteCond %{HTTPS} off
    RewriteRule ^ https://%{HTTP_HOST}%{REQUEST_URI} [R=301,L]
{% else %}
    ProxyPreserveHost On
    ProxyPass / http://127.0.0.1:{{ d.port }}/
    ProxyPassReverse / http://127.0.0.1:{{ d.port }}/

    RewriteEngine On
    RewriteCond %{HTTP:Upgrade} =websocket [NC]
    RewriteRule /(.*)           ws://127.0.0.1:{{ d.port }}/$1 [P,L]

    RequestHeader set X-Forwarded-Proto "http"
    RequestHeader set X-Forwarded-Port "80"
{% endif %}
    ErrorLog ${APACHE_LOG_DIR}/{{ d.name }}_error.log
    CustomLog ${APACHE_LOG_DIR}/{{ d.name }}_access.log combined
</VirtualHost>
{% if ssl %}
<VirtualHost *:443>
    ServerName {{ d.name }}

    SSLEngine on
    SSLCertificateFile {{ cert }}
    SSLCertificateKeyFile {{ key }}
    SSLProtocol all -SSLv3 -TLSv1 -TLSv1.1
    SSLCipherSuite HIGH:!aNULL:!MD5
    SSLHonorCipherOrder on

    Header always set Strict-Transport-Security "max-age=31536000; includeSubDomains"
    Header always set X-Frame-Options "SAMEORIGIN"
    Header always set X-Content-Type-Options "nosniff"

    ProxyPreserveHost On
    ProxyPass / http://127.0.0.1:{{ d.port }}/
    ProxyPassReverse / http://127.0.0.1:{{ d.port }}/

    RewriteEngine On
    RewriteCond %{HTTP:Upgrade} =websocket [NC]
    RewriteRule /(.*)           ws://127.0.0.1:{{ d.port }}/$1 [P,L]

    RequestHeader set X-Forwarded-Proto "https"
    RequestHeader set X-Forwarded-Port "443"

    ErrorLog ${APACHE_LOG_DIR}/{{ d.name }}_error.log
    CustomLog ${APACHE_LOG_DIR}/{{ d.name }}_access.log combined
</VirtualHost>
{% endif %}
{% endfor %}"#;

pub const APACHE_VALIDATION: &str = r#"{% for d in domains -%}
<VirtualHost *:80>
    ServerName {{ d.name }}

    ProxyPreserveHost On
    ProxyPass / http://127.0.0.1:{{ d.port }}/
    ProxyPassReverse / http://127.0.0.1:{{ d.port }}/

    RewriteEngine On
    RewriteCond %{HTTP:Upgrade} =websocket [NC]
    RewriteRule /(.*)           ws://127.0.0.1:{{ d.port }}/$1 [P,L]

    RequestHeader set X-Forwarded-Proto "http"
    RequestHeader set X-Forwarded-Port "80"

    ErrorLog ${APACHE_LOG_DIR}/{{ d.name }}_error.log
    CustomLog ${APACHE_LOG_DIR}/{{ d.name }}_access.log combined
</VirtualHost>
{% endfor %}"#;
