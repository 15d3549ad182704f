//! Sample Fly documents shared by tests across modules.

pub const CANONICAL_EGG: &str = r#"
egg "my-app" {
  type = "vm"

  cloud {
    provider = "yandex"
    region   = "ru-central1-a"
  }

  resources {
    cpu    = 2
    memory = 4096
    disk   = 20
  }

  runner {
    tags       = ["docker", "linux"]
    concurrent = 3
  }

  gitlab {
    project_id   = 12345
    server_name  = "gitlab.com"
    token_secret = "yc-lockbox://gitlab/runner-token"
  }
}
"#;

pub const EGGS_BUCKET: &str = r#"
eggsbucket "frontend" {
  type = "serverless"

  cloud {
    provider = "aws"
    region   = "eu-west-1"
  }

  resources {
    cpu    = 1
    memory = 2048
    disk   = 10
  }

  runner {
    tags         = ["node"]
    concurrent   = 2
    idle_timeout = "15m"
  }

  environment {
    NODE_ENV = "production"
  }

  repositories {
    repo "web" {
      gitlab {
        project_id   = 101
        server_name  = "gitlab.com"
        token_secret = "aws-sm://gitlab/web"
      }
    }

    repo "admin" {
      gitlab {
        project_id   = 102
        server_name  = "gitlab.com"
        token_secret = "aws-sm://gitlab/admin"
      }
    }
  }
}
"#;

pub const JOB: &str = r#"
job "cleanup" {
  schedule = "0 2 * * *"

  runner {
    type = "vm"
    tags = ["maintenance"]
  }

  script = <<-EOT
    echo "Cleaning up"
    docker system prune -f
    EOT
}
"#;

pub const UGLYFOX: &str = r#"
uglyfox {
  pruning {
    failed_threshold = 3
    max_age          = "24h"
    check_interval   = "5m"
  }

  runners_condition "default" {
    eggs_entities = ["my-app", "frontend"]

    apex {
      max_count     = 10
      min_count     = 2
      cpu_threshold = 80
    }

    nadir {
      max_count    = 2
      min_count    = 0
      idle_timeout = "30m"
    }
  }

  policies {
    rule "kill-failed" {
      condition = "failed_count > 3"
      action    = "terminate"
    }
  }
}
"#;

pub const MOTHERGOOSE: &str = r"
mothergoose {
  api_gateway {}
  fastapi_app {}
  celery_workers {}
  uglyfox_workers {}
  message_queues {}
  triggers {}
  database {}
  storage {}
  service_accounts {}
}
";
