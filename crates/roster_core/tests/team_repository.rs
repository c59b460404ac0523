use roster_core::db::open_db_in_memory;
use roster_core::{
    CrudRepository, Direction, Member, MemberRepository, RepoError, Session, Sort,
    SqliteMemberRepository, SqliteTeamRepository, Team, TeamRepository,
};
use std::rc::Rc;

#[test]
fn team_crud_and_find_by_name() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let teams = SqliteTeamRepository::try_new(&session).unwrap();

    let team_a = teams.save(Team::new("teamA")).unwrap();
    teams.save(Team::new("teamB")).unwrap();

    assert_eq!(teams.count().unwrap(), 2);
    let found = teams.find_by_name("teamA").unwrap();
    assert_eq!(found.len(), 1);
    assert!(Rc::ptr_eq(&found[0], &team_a));
    assert!(teams.find_by_name("teamC").unwrap().is_empty());

    let sorted = teams
        .find_all_sorted(&Sort::by(Direction::Desc, &["name"]))
        .unwrap();
    assert_eq!(sorted[0].borrow().name, "teamB");
}

#[test]
fn blank_team_name_is_rejected() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let teams = SqliteTeamRepository::try_new(&session).unwrap();

    assert!(matches!(
        teams.save(Team::new("")),
        Err(RepoError::Validation(_))
    ));
}

#[test]
fn load_members_follows_team_changes() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let teams = SqliteTeamRepository::try_new(&session).unwrap();
    let members = SqliteMemberRepository::try_new(&session).unwrap();

    let team_a = teams.save(Team::new("teamA")).unwrap();
    let team_b = teams.save(Team::new("teamB")).unwrap();
    let member1 = members
        .save(Member::with_team("member1", 10, &team_a.borrow()).unwrap())
        .unwrap();
    members
        .save(Member::with_team("member2", 20, &team_a.borrow()).unwrap())
        .unwrap();
    members.save(Member::new("member3")).unwrap();

    let in_a = teams.load_members(&team_a).unwrap();
    assert_eq!(in_a.len(), 2);
    assert!(Rc::ptr_eq(&in_a[0], &member1));

    member1.borrow_mut().change_team(&team_b.borrow()).unwrap();
    assert_eq!(teams.load_members(&team_a).unwrap().len(), 1);
    assert_eq!(teams.load_members(&team_b).unwrap().len(), 1);

    let unsaved = Rc::new(std::cell::RefCell::new(Team::new("teamC")));
    assert!(teams.load_members(&unsaved).unwrap().is_empty());
}

#[test]
fn deleting_member_keeps_its_team() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let teams = SqliteTeamRepository::try_new(&session).unwrap();
    let members = SqliteMemberRepository::try_new(&session).unwrap();

    let team = teams.save(Team::new("teamA")).unwrap();
    let team_id = team.borrow().id().unwrap();
    let member = members
        .save(Member::with_team("member1", 10, &team.borrow()).unwrap())
        .unwrap();

    members.delete(&member).unwrap();
    session.clear();

    assert_eq!(members.count().unwrap(), 0);
    assert_eq!(teams.count().unwrap(), 1);
    let reloaded = teams.find_by_id(team_id).unwrap().unwrap();
    assert_eq!(reloaded.borrow().name, "teamA");
}

#[test]
fn deleting_referenced_team_violates_constraint() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let teams = SqliteTeamRepository::try_new(&session).unwrap();
    let members = SqliteMemberRepository::try_new(&session).unwrap();

    let team = teams.save(Team::new("teamA")).unwrap();
    let member = members
        .save(Member::with_team("member1", 10, &team.borrow()).unwrap())
        .unwrap();

    assert!(matches!(
        teams.delete(&team),
        Err(RepoError::ConstraintViolation(_))
    ));

    member.borrow_mut().leave_team();
    teams.delete(&team).unwrap();
    assert_eq!(teams.count().unwrap(), 0);
    assert!(members.load_team(&member).unwrap().is_none());
}
